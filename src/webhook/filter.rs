use super::payload::ParsedPush;

const BRANCH_REF_PREFIX: &str = "refs/heads/";
const PUSH_EVENT: &str = "push";

/// What to do with an authenticated, well-formed delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Deploy { branch: String },
    IgnoreEvent { event: Option<String> },
    IgnoreBranch { branch: String },
}

/// Lets only push events for the target branch through
#[derive(Debug, Clone)]
pub struct EventFilter {
    target_branch: String,
}

impl EventFilter {
    pub fn new(target_branch: impl Into<String>) -> Self {
        Self {
            target_branch: target_branch.into(),
        }
    }

    pub fn target_branch(&self) -> &str {
        &self.target_branch
    }

    pub fn evaluate(&self, event_type: Option<&str>, push: &ParsedPush) -> FilterDecision {
        if event_type != Some(PUSH_EVENT) {
            return FilterDecision::IgnoreEvent {
                event: event_type.map(str::to_string),
            };
        }

        let branch = push
            .git_ref
            .strip_prefix(BRANCH_REF_PREFIX)
            .unwrap_or(&push.git_ref)
            .to_string();

        if branch != self.target_branch {
            return FilterDecision::IgnoreBranch { branch };
        }

        FilterDecision::Deploy { branch }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn push_to(git_ref: &str) -> ParsedPush {
        ParsedPush::from_value(&json!({ "ref": git_ref }))
    }

    #[test]
    fn test_push_to_target_branch_deploys() {
        let filter = EventFilter::new("main");
        assert_eq!(
            filter.evaluate(Some("push"), &push_to("refs/heads/main")),
            FilterDecision::Deploy {
                branch: "main".to_string()
            }
        );
    }

    #[test]
    fn test_other_branch_is_ignored() {
        let filter = EventFilter::new("main");
        assert_eq!(
            filter.evaluate(Some("push"), &push_to("refs/heads/dev")),
            FilterDecision::IgnoreBranch {
                branch: "dev".to_string()
            }
        );
    }

    #[test]
    fn test_non_push_events_are_ignored_before_branch_check() {
        let filter = EventFilter::new("main");
        let push = push_to("refs/heads/main");

        assert_eq!(
            filter.evaluate(Some("ping"), &push),
            FilterDecision::IgnoreEvent {
                event: Some("ping".to_string())
            }
        );
        assert_eq!(
            filter.evaluate(None, &push),
            FilterDecision::IgnoreEvent { event: None }
        );
        // Event type comparison is exact
        assert!(matches!(
            filter.evaluate(Some("Push"), &push),
            FilterDecision::IgnoreEvent { .. }
        ));
    }

    #[test]
    fn test_tags_and_empty_refs_do_not_deploy() {
        let filter = EventFilter::new("main");
        assert!(matches!(
            filter.evaluate(Some("push"), &push_to("refs/tags/main")),
            FilterDecision::IgnoreBranch { .. }
        ));
        assert_eq!(
            filter.evaluate(Some("push"), &push_to("")),
            FilterDecision::IgnoreBranch {
                branch: String::new()
            }
        );
    }

    #[test]
    fn test_nested_branch_names() {
        let filter = EventFilter::new("release/1.x");
        assert!(matches!(
            filter.evaluate(Some("push"), &push_to("refs/heads/release/1.x")),
            FilterDecision::Deploy { .. }
        ));
    }
}
