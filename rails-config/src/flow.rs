//! Flow-script scanning.
//!
//! The flow interpreter lives in the rails runtime. This module only reads
//! enough of a block to compare blocks, name them, and find the actions they
//! execute so the composer can check every action is bound.

use std::collections::BTreeSet;

/// Strip surrounding blank lines and the common indentation of a block.
pub fn normalize_block(block: &str) -> String {
    let lines: Vec<&str> = block.lines().map(str::trim_end).collect();

    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.is_empty())
        .map(|i| i + 1)
        .unwrap_or(start);
    let body = &lines[start..end];

    let indent = body
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    body.iter()
        .map(|l| l.get(indent..).unwrap_or_else(|| l.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Names declared by `define flow <name>` lines in a block.
///
/// Anonymous flows (`define flow` with no name) are skipped.
pub fn flow_names(block: &str) -> Vec<String> {
    block
        .lines()
        .filter_map(|line| line.trim().strip_prefix("define flow"))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// Actions invoked with `execute <name>(...)` anywhere in a block.
pub fn referenced_actions(block: &str) -> BTreeSet<String> {
    let mut actions = BTreeSet::new();

    for line in block.lines() {
        let mut rest = line;
        while let Some(pos) = rest.find("execute ") {
            // Must be a standalone word, not the tail of an identifier.
            let preceded_by_ident = rest[..pos]
                .chars()
                .next_back()
                .map(|c| c.is_alphanumeric() || c == '_')
                .unwrap_or(false);

            let after = &rest[pos + "execute ".len()..];
            let name: String = after
                .trim_start()
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();

            if !preceded_by_ident && !name.is_empty() {
                actions.insert(name);
            }
            rest = after;
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACTS_FLOW: &str = r#"
            define flow self check facts
              user ask question
              $bot_response = execute llm(query=$last_user_message)
              $fact_check_result = execute self_check_facts(user_message=$last_user_message, bot_message=$bot_response)
              bot $fact_check_result
        "#;

    #[test]
    fn test_normalize_strips_common_indent() {
        let normalized = normalize_block(FACTS_FLOW);
        assert!(normalized.starts_with("define flow self check facts\n  user ask question"));
        assert!(!normalized.ends_with('\n'));
        assert_eq!(normalize_block(&normalized), normalized);
    }

    #[test]
    fn test_flow_names() {
        assert_eq!(flow_names(FACTS_FLOW), vec!["self check facts".to_string()]);
        assert!(flow_names("define flow\n  user express intent on politics").is_empty());
    }

    #[test]
    fn test_referenced_actions() {
        let actions = referenced_actions(FACTS_FLOW);
        assert_eq!(
            actions.into_iter().collect::<Vec<_>>(),
            vec!["llm".to_string(), "self_check_facts".to_string()]
        );

        assert!(referenced_actions("bot refuse to respond").is_empty());
        assert!(referenced_actions("$x = reexecute foo()").is_empty());
    }
}
