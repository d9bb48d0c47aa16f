//! Terminal output for todos.

use todo_tracker::filters::PaginationData;
use todo_tracker::todos::Todo;

use crate::api_client::BatchItem;

/// One todo as a todo.txt style line prefixed with its id.
///
/// ```
/// # use chrono::Utc;
/// # use todo_tracker::todos::Todo;
/// let todo = Todo {
///     id: 3,
///     user_id: 1,
///     created_at: Utc::now(),
///     text: "call mom @phone".to_string(),
///     contexts: vec!["phone".to_string()],
///     projects: vec![],
///     priority: "A".to_string(),
///     completed: true,
///     archived: false,
///     version: 2,
/// };
/// assert_eq!(tt_client::render::todo_line(&todo), "3 x (A) call mom @phone");
/// ```
pub fn todo_line(todo: &Todo) -> String {
    let mut line = format!("{}", todo.id);
    if todo.completed {
        line.push_str(" x");
    }
    if !todo.priority.is_empty() {
        line.push_str(&format!(" ({})", todo.priority));
    }
    line.push(' ');
    line.push_str(&todo.text);
    if todo.archived {
        line.push_str(" [archived]");
    }
    line
}

/// The whole list plus a page footer.
pub fn todo_list(todos: &[Todo], pagination: &PaginationData) -> String {
    if todos.is_empty() {
        return "No matches found.".to_string();
    }

    let mut out: Vec<String> = todos.iter().map(todo_line).collect();
    if pagination.last_page > 1 {
        out.push(format!(
            "-- page {} of {} ({} todos)",
            pagination.current_page, pagination.last_page, pagination.total_records
        ));
    }
    out.join("\n")
}

pub fn batch_results(results: &[BatchItem]) -> String {
    results
        .iter()
        .map(|item| match (&item.error, item.success) {
            (_, true) => format!("{}: deleted", item.id),
            (Some(error), false) => format!("{}: {}", item.id, error),
            (None, false) => format!("{}: failed", item.id),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn todo(id: i64, text: &str) -> Todo {
        Todo {
            id,
            user_id: 1,
            created_at: Utc::now(),
            text: text.to_string(),
            contexts: vec![],
            projects: vec![],
            priority: String::new(),
            completed: false,
            archived: false,
            version: 1,
        }
    }

    #[test]
    fn test_plain_and_archived_lines() {
        assert_eq!(todo_line(&todo(1, "buy milk")), "1 buy milk");

        let mut archived = todo(2, "old thing");
        archived.archived = true;
        assert_eq!(todo_line(&archived), "2 old thing [archived]");
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(todo_list(&[], &PaginationData::default()), "No matches found.");
    }

    #[test]
    fn test_footer_only_when_paged() {
        let todos = vec![todo(1, "a"), todo(2, "b")];
        let single = PaginationData::calculate(2, 1, 20);
        assert_eq!(todo_list(&todos, &single), "1 a\n2 b");

        let paged = PaginationData::calculate(45, 2, 20);
        assert!(todo_list(&todos, &paged).ends_with("-- page 2 of 3 (45 todos)"));
    }

    #[test]
    fn test_batch_results() {
        let results = vec![
            BatchItem {
                id: "1".to_string(),
                success: true,
                error: None,
            },
            BatchItem {
                id: "999".to_string(),
                success: false,
                error: Some("not found".to_string()),
            },
        ];
        assert_eq!(batch_results(&results), "1: deleted\n999: not found");
    }
}
