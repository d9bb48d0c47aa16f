//! Todo items, their validation rules and a todo.txt line parser.
//!
//! Todos follow the [todo.txt](http://todotxt.org/) conventions: `x ` marks a
//! completed item, `(A) ` sets a priority, `@word` is a context and `+word` a
//! project. The text itself is always stored verbatim.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::users::UserId;
use crate::validator::{Validator, unique};

/// Maximum body size in bytes (exclusive).
pub const MAX_TEXT_BYTES: usize = 500;

/// Maximum number of contexts and of projects per todo.
pub const MAX_TAGS: usize = 5;

static PRIORITY_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(([A-Z])\) ").expect("priority pattern is a valid regex"));

/// Todo model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Todo {
    pub id: i64,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<String>,
    pub priority: String,
    pub completed: bool,
    pub archived: bool,
    pub version: i32,
}

/// Fields supplied when creating a todo. Owner comes from the caller's identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTodo {
    pub text: String,
    pub contexts: Vec<String>,
    pub projects: Vec<String>,
    pub priority: String,
    pub completed: bool,
    pub archived: bool,
}

impl NewTodo {
    pub fn validate(&self, v: &mut Validator) {
        validate_fields(
            v,
            &self.text,
            &self.contexts,
            &self.projects,
            &self.priority,
        );
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TodoPatch {
    pub text: Option<String>,
    pub contexts: Option<Vec<String>>,
    pub projects: Option<Vec<String>>,
    pub priority: Option<String>,
    pub completed: Option<bool>,
    pub archived: Option<bool>,
    /// Version the client last saw. Absent means "the version just read".
    pub version: Option<i32>,
}

impl TodoPatch {
    /// Apply present fields to `todo`.
    pub fn apply(&self, todo: &mut Todo) {
        if let Some(text) = &self.text {
            todo.text = text.clone();
        }
        if let Some(contexts) = &self.contexts {
            todo.contexts = contexts.clone();
        }
        if let Some(projects) = &self.projects {
            todo.projects = projects.clone();
        }
        if let Some(priority) = &self.priority {
            todo.priority = priority.clone();
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
        if let Some(archived) = self.archived {
            todo.archived = archived;
        }
    }
}

/// Validate a stored or merged todo.
pub fn validate_todo(v: &mut Validator, todo: &Todo) {
    validate_fields(
        v,
        &todo.text,
        &todo.contexts,
        &todo.projects,
        &todo.priority,
    );
}

fn validate_fields(
    v: &mut Validator,
    text: &str,
    contexts: &[String],
    projects: &[String],
    priority: &str,
) {
    v.check(!text.is_empty(), "text", "must be provided");
    v.check(
        text.len() < MAX_TEXT_BYTES,
        "text",
        format!("must be less than {MAX_TEXT_BYTES} bytes"),
    );

    v.check(
        contexts.len() <= MAX_TAGS,
        "contexts",
        format!("must be no more than {MAX_TAGS} contexts"),
    );
    v.check(
        unique(contexts),
        "contexts",
        "must not contain duplicate values",
    );

    v.check(
        projects.len() <= MAX_TAGS,
        "projects",
        format!("must be no more than {MAX_TAGS} projects"),
    );
    v.check(
        unique(projects),
        "projects",
        "must not contain duplicate values",
    );

    v.check(
        is_priority(priority),
        "priority",
        "must be a capital letter (A to Z) or empty string",
    );
}

fn is_priority(priority: &str) -> bool {
    match priority.as_bytes() {
        [] => true,
        [c] => c.is_ascii_uppercase(),
        _ => false,
    }
}

/// Parse one todo.txt line.
///
/// A priority after a completion marker is not honoured, matching todo.txt,
/// where completed items drop their priority.
pub fn parse_todo(line: &str) -> NewTodo {
    let completed = line.starts_with("x ");
    let priority = PRIORITY_RX
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let mut contexts: Vec<String> = Vec::new();
    let mut projects: Vec<String> = Vec::new();
    for word in line.split_whitespace() {
        if let Some(tag) = word.strip_prefix('@').filter(|t| !t.is_empty()) {
            if !contexts.iter().any(|c| c == tag) {
                contexts.push(tag.to_string());
            }
        } else if let Some(tag) = word.strip_prefix('+').filter(|t| !t.is_empty()) {
            if !projects.iter().any(|p| p == tag) {
                projects.push(tag.to_string());
            }
        }
    }

    NewTodo {
        text: line.to_string(),
        contexts,
        projects,
        priority,
        completed,
        archived: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_todo() -> Todo {
        Todo {
            id: 1,
            user_id: 1,
            created_at: Utc::now(),
            text: "call mom".to_string(),
            contexts: vec!["phone".to_string()],
            projects: vec![],
            priority: "A".to_string(),
            completed: false,
            archived: false,
            version: 1,
        }
    }

    #[test]
    fn test_parse_completion_marker() {
        assert!(parse_todo("x (A) do something").completed);
        assert!(!parse_todo("X do something").completed);
        assert!(!parse_todo("(A) x do something").completed);
    }

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_todo("(B) do something").priority, "B");
        assert_eq!(parse_todo("(A) x do something").priority, "A");
        assert_eq!(parse_todo("(b) do something").priority, "");
        assert_eq!(parse_todo("do (B) something").priority, "");
        assert_eq!(parse_todo("(B)do something").priority, "");
        assert_eq!(parse_todo("x (A) do something").priority, "");
    }

    #[test]
    fn test_parse_tags() {
        let todo = parse_todo("buy milk @home +shopping @home @ +");
        assert_eq!(todo.text, "buy milk @home +shopping @home @ +");
        assert_eq!(todo.contexts, vec!["home"]);
        assert_eq!(todo.projects, vec!["shopping"]);
    }

    #[test]
    fn test_validate_rules() {
        let mut todo = sample_todo();
        todo.text = String::new();
        todo.contexts = vec!["a".into(), "a".into()];
        todo.projects = (0..6).map(|i| i.to_string()).collect();
        todo.priority = "AB".to_string();

        let mut v = Validator::new();
        validate_todo(&mut v, &todo);
        let errors = v.into_errors();

        assert_eq!(errors["text"], "must be provided");
        assert_eq!(errors["contexts"], "must not contain duplicate values");
        assert_eq!(errors["projects"], "must be no more than 5 projects");
        assert_eq!(
            errors["priority"],
            "must be a capital letter (A to Z) or empty string"
        );
    }

    #[test]
    fn test_text_must_be_under_limit() {
        let mut todo = sample_todo();
        todo.text = "a".repeat(MAX_TEXT_BYTES);

        let mut v = Validator::new();
        validate_todo(&mut v, &todo);
        assert_eq!(v.errors()["text"], "must be less than 500 bytes");

        todo.text = "a".repeat(MAX_TEXT_BYTES - 1);
        let mut v = Validator::new();
        validate_todo(&mut v, &todo);
        assert!(v.valid());
    }

    #[test]
    fn test_patch_applies_present_fields_only() {
        let mut todo = sample_todo();
        let patch = TodoPatch {
            completed: Some(true),
            priority: Some(String::new()),
            ..Default::default()
        };

        patch.apply(&mut todo);

        assert!(todo.completed);
        assert_eq!(todo.priority, "");
        assert_eq!(todo.text, "call mom");
        assert_eq!(todo.contexts, vec!["phone"]);
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let err = serde_json::from_str::<TodoPatch>(r#"{"title":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn test_empty_tags_are_omitted_from_json() {
        let mut todo = sample_todo();
        todo.contexts.clear();
        let json = serde_json::to_value(&todo).unwrap();
        assert!(json.get("contexts").is_none());
        assert!(json.get("projects").is_none());
        assert_eq!(json["version"], 1);
    }
}
