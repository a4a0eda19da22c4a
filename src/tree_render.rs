//! ASCII rendering of the project forest.

use uuid::Uuid;

use crate::models::{ProjectForest, ProjectNode};

const CURRENT: char = '●';
const SAVED: char = '○';

/// Render every tree of `forest` with branch labels; `highlight` marks one
/// project (usually the one being edited).
///
/// Example output:
/// ```text
/// ○ [A] Baseline
/// ├── ● [A-A] Cheaper supplier
/// │   └── ○ [A-A-A] Sea freight
/// └── ○ [A-B] Higher price
/// ○ [B] Second product
/// ```
pub fn render_forest(forest: &ProjectForest, highlight: Option<Uuid>) -> String {
    let mut output = String::new();
    for root in &forest.roots {
        render_node(&mut output, root, highlight, "", None);
    }
    output
}

/// `is_last` is `None` for roots, which get no branch characters.
fn render_node(
    output: &mut String,
    node: &ProjectNode,
    highlight: Option<Uuid>,
    prefix: &str,
    is_last: Option<bool>,
) {
    let symbol = if highlight == Some(node.project.id) {
        CURRENT
    } else {
        SAVED
    };

    output.push_str(prefix);
    if let Some(is_last) = is_last {
        output.push_str(if is_last { "└── " } else { "├── " });
    }
    output.push(symbol);
    output.push_str(&format!(" [{}] {}\n", node.project.branch_path, node.project.name));

    let child_prefix = match is_last {
        None => String::new(),
        Some(true) => format!("{prefix}    "),
        Some(false) => format!("{prefix}│   "),
    };

    for (i, child) in node.children.iter().enumerate() {
        let child_is_last = i == node.children.len() - 1;
        render_node(output, child, highlight, &child_prefix, Some(child_is_last));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectSummary;
    use chrono::Utc;

    fn make_node(path: &str, name: &str, children: Vec<ProjectNode>) -> ProjectNode {
        ProjectNode {
            project: ProjectSummary {
                id: Uuid::new_v4(),
                name: name.to_string(),
                description: String::new(),
                parent_id: None,
                branch_path: path.to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            children,
        }
    }

    #[test]
    fn test_empty_forest() {
        assert_eq!(render_forest(&ProjectForest::default(), None), "");
    }

    #[test]
    fn test_roots_without_branches() {
        let forest = ProjectForest {
            roots: vec![make_node("A", "Baseline", vec![]), make_node("B", "Other", vec![])],
        };
        assert_eq!(render_forest(&forest, None), "○ [A] Baseline\n○ [B] Other\n");
    }

    #[test]
    fn test_nested_branches_and_highlight() {
        let cheaper = make_node(
            "A-A",
            "Cheaper supplier",
            vec![make_node("A-A-A", "Sea freight", vec![])],
        );
        let highlight = cheaper.project.id;
        let forest = ProjectForest {
            roots: vec![make_node(
                "A",
                "Baseline",
                vec![cheaper, make_node("A-B", "Higher price", vec![])],
            )],
        };

        let expected = "○ [A] Baseline\n├── ● [A-A] Cheaper supplier\n│   └── ○ [A-A-A] Sea freight\n└── ○ [A-B] Higher price\n";
        assert_eq!(render_forest(&forest, Some(highlight)), expected);
    }
}
