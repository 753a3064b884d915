// KQL expand pass — §4.B.
//
// Remaps keys through a closed table, lowercases string values (except
// `Hidden`), and unfolds synthetic media-type aliases into concrete MIME
// alternatives. Grounded on
// examples/original_source/services/search/pkg/opensearch/internal/convert/kql_expand.go;
// the remap table and the media-type alias table below are reproduced
// verbatim from that source.

use crate::errors::Result;
use crate::kql::ast::{Node, Operator, Query};

/// Remap a raw KQL key to its canonical resource-field name. An empty key
/// falls back to `default_key`, which itself falls back to `Name` — the
/// GroupNode default-key rule preserved per SPEC_FULL.md §9 Open Question 3.
fn remap_key(current: &str, default_key: &str) -> String {
    let default_key = if default_key.is_empty() {
        "Name"
    } else {
        default_key
    };

    match current {
        "" => default_key.to_string(),
        "rootid" => "RootID".to_string(),
        "path" => "Path".to_string(),
        "id" => "ID".to_string(),
        "name" => "Name".to_string(),
        "size" => "Size".to_string(),
        "mtime" => "Mtime".to_string(),
        "mediatype" => "MimeType".to_string(),
        "type" => "Type".to_string(),
        "tag" | "tags" => "Tags".to_string(),
        "content" => "Content".to_string(),
        "hidden" => "Hidden".to_string(),
        other => other.to_string(),
    }
}

fn lower_value(key: &str, value: &str) -> String {
    if key == "Hidden" {
        value.to_string()
    } else {
        value.to_lowercase()
    }
}

fn string_node(key: &str, value: &str) -> Node {
    Node::String {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn or_group(key: &str, values: &[&str]) -> Node {
    let mut nodes = Vec::with_capacity(values.len() * 2 - 1);
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            nodes.push(Node::Operator(Operator::Or));
        }
        nodes.push(string_node(key, v));
    }
    Node::Group { key: None, nodes }
}

/// Unfold a synthetic `MimeType` alias into its concrete form(s). Returns
/// `None` when `key:value` is not one of the recognized aliases.
fn unfold_value(key: &str, value: &str) -> Option<Vec<Node>> {
    if key != "MimeType" {
        return None;
    }

    let nodes = match value {
        "file" => vec![
            Node::Operator(Operator::Not),
            string_node(key, "httpd/unix-directory"),
        ],
        "folder" => vec![string_node(key, "httpd/unix-directory")],
        "document" => vec![or_group(
            key,
            &[
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.form",
                "application/vnd.oasis.opendocument.text",
                "text/plain",
                "text/markdown",
                "application/rtf",
                "application/vnd.apple.pages",
            ],
        )],
        "spreadsheet" => vec![or_group(
            key,
            &[
                "application/vnd.ms-excel",
                "application/vnd.oasis.opendocument.spreadsheet",
                "text/csv",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "application/vnd.oasis.opendocument.spreadshee",
                "application/vnd.apple.numbers",
            ],
        )],
        "presentation" => vec![or_group(
            key,
            &[
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                "application/vnd.oasis.opendocument.presentation",
                "application/vnd.ms-powerpoint",
                "application/vnd.apple.keynote",
            ],
        )],
        "pdf" => vec![string_node(key, "application/pdf")],
        "image" => vec![string_node(key, "image/*")],
        "video" => vec![string_node(key, "video/*")],
        "audio" => vec![string_node(key, "audio/*")],
        "archive" => vec![or_group(
            key,
            &[
                "application/zip",
                "application/gzip",
                "application/x-gzip",
                "application/x-7z-compressed",
                "application/x-rar-compressed",
                "application/x-tar",
                "application/x-bzip2",
                "application/x-bzip",
                "application/x-tgz",
            ],
        )],
        _ => return None,
    };
    Some(nodes)
}

fn expand_list(nodes: Vec<Node>, default_key: &str) -> Result<Vec<Node>> {
    let mut out = Vec::with_capacity(nodes.len());

    for node in nodes {
        match node {
            Node::Group { key, nodes: inner } => {
                let group_key = key.map(|k| remap_key(&k, default_key));
                let new_default = group_key.as_deref().unwrap_or(default_key);
                let expanded_inner = expand_list(inner, new_default)?;
                out.push(Node::Group {
                    key: group_key,
                    nodes: expanded_inner,
                });
            }
            Node::String { key, value } => {
                let key = remap_key(&key, default_key);
                let value = lower_value(&key, &value);
                match unfold_value(&key, &value) {
                    Some(unfolded) => out.extend(unfolded),
                    None => out.push(Node::String { key, value }),
                }
            }
            Node::DateTime { key, op, value } => {
                out.push(Node::DateTime {
                    key: remap_key(&key, default_key),
                    op,
                    value,
                });
            }
            Node::Boolean { key, value } => {
                out.push(Node::Boolean {
                    key: remap_key(&key, default_key),
                    value,
                });
            }
            op @ Node::Operator(_) => out.push(op),
        }
    }

    Ok(out)
}

/// Expand a parsed KQL query in place, per §4.B's expand pass.
pub fn expand(query: Query) -> Result<Query> {
    let nodes = expand_list(query.nodes, "")?;
    Ok(Query::new(nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kql::parser::parse;

    #[test]
    fn remaps_bare_key_to_name() {
        let q = expand(parse("report").unwrap()).unwrap();
        assert_eq!(
            q.nodes[0],
            Node::String {
                key: "Name".to_string(),
                value: "report".to_string()
            }
        );
    }

    #[test]
    fn lowercases_values_except_hidden() {
        let q = expand(parse("name:REPORT").unwrap()).unwrap();
        assert_eq!(
            q.nodes[0],
            Node::String {
                key: "Name".to_string(),
                value: "report".to_string()
            }
        );

        let q = expand(parse("hidden:true").unwrap()).unwrap();
        assert_eq!(
            q.nodes[0],
            Node::Boolean {
                key: "Hidden".to_string(),
                value: true
            }
        );
    }

    #[test]
    fn unfolds_folder_alias() {
        let q = expand(parse("mediatype:folder").unwrap()).unwrap();
        assert_eq!(q.nodes.len(), 1);
        assert_eq!(
            q.nodes[0],
            Node::String {
                key: "MimeType".to_string(),
                value: "httpd/unix-directory".to_string()
            }
        );
    }

    #[test]
    fn unfolds_file_alias_to_negated_folder() {
        let q = expand(parse("mediatype:file").unwrap()).unwrap();
        assert_eq!(q.nodes.len(), 2);
        assert_eq!(q.nodes[0], Node::Operator(Operator::Not));
        assert_eq!(
            q.nodes[1],
            Node::String {
                key: "MimeType".to_string(),
                value: "httpd/unix-directory".to_string()
            }
        );
    }

    #[test]
    fn unfolds_document_alias_to_exact_group() {
        let q = expand(parse("mediatype:document").unwrap()).unwrap();
        assert_eq!(q.nodes.len(), 1);
        match &q.nodes[0] {
            Node::Group { key, nodes } => {
                assert!(key.is_none());
                let values: Vec<&str> = nodes
                    .iter()
                    .filter_map(|n| match n {
                        Node::String { value, .. } => Some(value.as_str()),
                        _ => None,
                    })
                    .collect();
                assert_eq!(
                    values,
                    vec![
                        "application/msword",
                        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                        "application/vnd.openxmlformats-officedocument.wordprocessingml.form",
                        "application/vnd.oasis.opendocument.text",
                        "text/plain",
                        "text/markdown",
                        "application/rtf",
                        "application/vnd.apple.pages",
                    ]
                );
            }
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn group_key_propagates_as_default_to_children() {
        let q = expand(parse("tag:(a OR b)").unwrap()).unwrap();
        match &q.nodes[0] {
            Node::Group { key, nodes } => {
                assert_eq!(key.as_deref(), Some("Tags"));
                assert_eq!(
                    nodes[0],
                    Node::String {
                        key: "Tags".to_string(),
                        value: "a".to_string()
                    }
                );
            }
            other => panic!("expected group, got {other:?}"),
        }
    }
}
