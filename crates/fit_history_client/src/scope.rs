//! Authorization scopes, correlation codes and consent outcomes.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::DataType;

const OAUTH_SCOPE_PREFIX: &str = "https://www.googleapis.com/auth/fitness";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
}

impl Access {
    fn as_str(self) -> &'static str {
        match self {
            Access::Read => "read",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    ActivitySessions,
    Data(DataType),
}

impl Category {
    fn scope_area(&self) -> &'static str {
        match self {
            Category::ActivitySessions => "activity",
            Category::Data(data_type) => data_type.scope_area,
        }
    }
}

/// Categories and access levels requested from the identity provider.
///
/// Entries keep insertion order and are not deduplicated; the OAuth scope list
/// derived from them is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorizationScope {
    entries: Vec<(Category, Access)>,
}

impl AuthorizationScope {
    pub fn builder() -> AuthorizationScopeBuilder {
        AuthorizationScopeBuilder::default()
    }

    /// Session reads: activity sessions plus each data type, read-only.
    pub fn sessions(data_types: &[DataType]) -> Self {
        data_types
            .iter()
            .fold(
                Self::builder().access_activity_sessions(Access::Read),
                |b, t| b.add_data_type(*t, Access::Read),
            )
            .build()
    }

    /// History reads: each data type, read-only.
    pub fn history(data_types: &[DataType]) -> Self {
        data_types
            .iter()
            .fold(Self::builder(), |b, t| b.add_data_type(*t, Access::Read))
            .build()
    }

    pub fn entries(&self) -> &[(Category, Access)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// OAuth scope URLs covering every entry, sorted and deduplicated.
    pub fn oauth_scopes(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(category, access)| {
                format!(
                    "{}.{}.{}",
                    OAUTH_SCOPE_PREFIX,
                    category.scope_area(),
                    access.as_str()
                )
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Default)]
pub struct AuthorizationScopeBuilder {
    entries: Vec<(Category, Access)>,
}

impl AuthorizationScopeBuilder {
    pub fn access_activity_sessions(mut self, access: Access) -> Self {
        self.entries.push((Category::ActivitySessions, access));
        self
    }

    pub fn add_data_type(mut self, data_type: DataType, access: Access) -> Self {
        self.entries.push((Category::Data(data_type), access));
        self
    }

    pub fn build(self) -> AuthorizationScope {
        AuthorizationScope {
            entries: self.entries,
        }
    }
}

/// Caller-chosen code correlating a consent request with its outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestCode(pub i32);

impl RequestCode {
    pub const SESSION_PERMISSIONS: RequestCode = RequestCode(1111);
    pub const HISTORY_PERMISSIONS: RequestCode = RequestCode(1112);
}

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "code", rename_all = "snake_case")]
pub enum AuthorizationOutcome {
    Granted,
    Cancelled,
    Failed(i32),
}

impl AuthorizationOutcome {
    pub const RESULT_OK: i32 = -1;
    pub const RESULT_CANCELED: i32 = 0;

    /// Map a host result code onto an outcome.
    pub fn from_result_code(code: i32) -> Self {
        match code {
            Self::RESULT_OK => AuthorizationOutcome::Granted,
            Self::RESULT_CANCELED => AuthorizationOutcome::Cancelled,
            other => AuthorizationOutcome::Failed(other),
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, AuthorizationOutcome::Granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_scope_lists_sessions_then_types() {
        let scope = AuthorizationScope::sessions(&[DataType::HEART_RATE_BPM]);
        assert_eq!(
            scope.entries(),
            &[
                (Category::ActivitySessions, Access::Read),
                (Category::Data(DataType::HEART_RATE_BPM), Access::Read)
            ]
        );
    }

    #[test]
    fn oauth_scopes_are_deduplicated() {
        let scope = AuthorizationScope::sessions(&[
            DataType::HEART_RATE_BPM,
            DataType::AGGREGATE_HEART_RATE_SUMMARY,
            DataType::STEP_COUNT_DELTA,
            DataType::AGGREGATE_STEP_COUNT_DELTA,
        ]);
        assert_eq!(scope.entries().len(), 5);
        assert_eq!(
            scope.oauth_scopes(),
            vec![
                "https://www.googleapis.com/auth/fitness.activity.read".to_string(),
                "https://www.googleapis.com/auth/fitness.heart_rate.read".to_string(),
            ]
        );
    }

    #[test]
    fn history_scope_has_no_session_entry() {
        let scope = AuthorizationScope::history(&[DataType::STEP_COUNT_DELTA]);
        assert_eq!(scope.entries().len(), 1);
        assert!(
            !scope
                .entries()
                .iter()
                .any(|(c, _)| *c == Category::ActivitySessions)
        );
    }

    #[test]
    fn result_codes_map_to_outcomes() {
        assert_eq!(
            AuthorizationOutcome::from_result_code(-1),
            AuthorizationOutcome::Granted
        );
        assert_eq!(
            AuthorizationOutcome::from_result_code(0),
            AuthorizationOutcome::Cancelled
        );
        assert_eq!(
            AuthorizationOutcome::from_result_code(7),
            AuthorizationOutcome::Failed(7)
        );
    }

    #[test]
    fn request_codes_are_distinct() {
        assert_ne!(
            RequestCode::SESSION_PERMISSIONS,
            RequestCode::HISTORY_PERMISSIONS
        );
    }
}
