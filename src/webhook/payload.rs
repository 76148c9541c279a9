use serde_json::Value;

/// Fields of a push notification the pipeline cares about
///
/// Missing or mistyped fields fall back to placeholders instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPush {
    pub git_ref: String,
    pub commit_id: String,
    pub commit_message: String,
    pub committer: String,
    pub repository: String,
}

const UNKNOWN_ID: &str = "unknown";
const UNKNOWN_COMMITTER: &str = "Unknown";
const NO_MESSAGE: &str = "No commit message";
const UNKNOWN_REPOSITORY: &str = "unknown";

impl ParsedPush {
    pub fn from_value(value: &Value) -> Self {
        let field = |pointer: &str, fallback: &str| {
            value
                .pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string()
        };

        Self {
            git_ref: field("/ref", ""),
            commit_id: field("/head_commit/id", UNKNOWN_ID),
            commit_message: field("/head_commit/message", NO_MESSAGE),
            committer: field("/head_commit/committer/name", UNKNOWN_COMMITTER),
            repository: field("/repository/full_name", UNKNOWN_REPOSITORY),
        }
    }

    /// First seven characters of the commit id
    pub fn short_sha(&self) -> &str {
        match self.commit_id.char_indices().nth(7) {
            Some((idx, _)) => &self.commit_id[..idx],
            None => &self.commit_id,
        }
    }

    /// `Commit: [abcdef0] by Jane - fix bug`
    pub fn summary(&self) -> String {
        format!(
            "Commit: [{}] by {} - {}",
            self.short_sha(),
            self.committer,
            self.commit_message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_payload() {
        let push = ParsedPush::from_value(&json!({
            "ref": "refs/heads/main",
            "head_commit": {
                "id": "abcdef0123456789",
                "message": "fix bug",
                "committer": { "name": "Jane" }
            },
            "repository": { "full_name": "acme/site" }
        }));

        assert_eq!(push.git_ref, "refs/heads/main");
        assert_eq!(push.short_sha(), "abcdef0");
        assert_eq!(push.committer, "Jane");
        assert_eq!(push.repository, "acme/site");
        assert_eq!(push.summary(), "Commit: [abcdef0] by Jane - fix bug");
    }

    #[test]
    fn test_missing_fields_use_placeholders() {
        let push = ParsedPush::from_value(&json!({ "ref": "refs/heads/main" }));

        assert_eq!(push.commit_id, "unknown");
        assert_eq!(push.committer, "Unknown");
        assert_eq!(push.commit_message, "No commit message");
        assert_eq!(push.repository, "unknown");
    }

    #[test]
    fn test_wrong_types_and_non_objects() {
        let push = ParsedPush::from_value(&json!({ "ref": 7, "head_commit": null }));
        assert_eq!(push.git_ref, "");
        assert_eq!(push.committer, "Unknown");

        let push = ParsedPush::from_value(&json!([1, 2, 3]));
        assert_eq!(push.git_ref, "");
        assert_eq!(push.short_sha(), "unknown");
    }

    #[test]
    fn test_short_sha_of_short_and_multibyte_ids() {
        let push = ParsedPush::from_value(&json!({ "head_commit": { "id": "abc" } }));
        assert_eq!(push.short_sha(), "abc");

        let push = ParsedPush::from_value(&json!({ "head_commit": { "id": "ééééééééé" } }));
        assert_eq!(push.short_sha(), "ééééééé");
    }
}
