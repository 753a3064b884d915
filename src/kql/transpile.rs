// KQL transpile pass — §4.B.
//
// Grounded on
// examples/original_source/services/search/pkg/opensearch/internal/convert/kql_transpile.go.
// 0 nodes is an error; 1 node transpiles directly; N>1 nodes become a
// BoolQuery whose must/should/must_not placement is decided by the
// operator immediately before/after each value node.

use crate::dsl::{BoolQuery, BoolQueryOptions, Builder, MatchPhraseQuery, RangeQuery, TermQuery, WildcardQuery};
use crate::errors::{Error, Result};
use crate::kql::ast::{CompareOp, Node, Operator};

/// Which clause list a node's builder currently lands in. Sticky across
/// nodes: it only changes when a node's neighboring operators say so,
/// otherwise it carries over from the previous node — including across
/// operator nodes themselves, which are never added as builders but still
/// take part in this state transition. This mirrors the Go transpiler's
/// `boolQueryAdd` closure variable, which is reassigned by a `switch` with
/// no `default` case and so simply keeps its prior value when none of the
/// cases match.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Clause {
    Must,
    Should,
    MustNot,
}

/// Transpile an expanded KQL node list into a backend-DSL builder tree.
pub fn transpile(nodes: &[Node]) -> Result<Box<dyn Builder>> {
    if nodes.is_empty() {
        return Err(Error::InvalidQuery("no nodes to compile".to_string()));
    }

    if nodes.len() == 1 {
        return to_builder(&nodes[0]);
    }

    let mut bool_query = BoolQuery::new();
    let mut minimum_should_match = 0i16;
    let mut clause = Clause::Must;

    for (i, node) in nodes.iter().enumerate() {
        let next_op = operator_at(nodes, i as isize + 1);
        let prev_op = operator_at(nodes, i as isize - 1);

        // Order matters: mirrors the Go switch's case ordering exactly —
        // nextOp==OR, then nextOp==AND, then prevOp==NOT. No case means
        // `clause` keeps whatever it already was.
        if next_op == Some(Operator::Or) {
            clause = Clause::Should;
        } else if next_op == Some(Operator::And) {
            clause = Clause::Must;
        } else if prev_op == Some(Operator::Not) {
            clause = Clause::MustNot;
        }

        if node.is_operator() {
            continue;
        }

        let builder = to_builder(node)?;

        if next_op == Some(Operator::Or) {
            minimum_should_match = 1;
        }

        bool_query = match clause {
            Clause::Must => bool_query.must(builder),
            Clause::Should => bool_query.should(builder),
            Clause::MustNot => bool_query.must_not(builder),
        };
    }

    bool_query.set_minimum_should_match(minimum_should_match);
    let _ = BoolQueryOptions::default(); // keep the options type in scope for readers
    Ok(Box::new(bool_query))
}

fn operator_at(nodes: &[Node], i: isize) -> Option<Operator> {
    if i < 0 || i as usize >= nodes.len() {
        return None;
    }
    match &nodes[i as usize] {
        Node::Operator(op) => Some(*op),
        _ => None,
    }
}

fn to_builder(node: &Node) -> Result<Box<dyn Builder>> {
    match node {
        Node::Boolean { key, value } => Ok(Box::new(TermQuery::new(key.clone()).value(*value))),
        Node::String { key, value } => {
            if value.contains('*') {
                return Ok(Box::new(WildcardQuery::new(key.clone()).value(value.clone())));
            }
            let is_single_term = !value.contains(' ');
            if is_single_term {
                Ok(Box::new(TermQuery::new(key.clone()).value(value.clone())))
            } else {
                Ok(Box::new(MatchPhraseQuery::new(key.clone()).query(value.clone())))
            }
        }
        Node::DateTime { key, op, value } => {
            let q = RangeQuery::new(key.clone());
            let q = match op {
                CompareOp::Gt => q.gt(value.as_str()),
                CompareOp::Gte => q.gte(value.as_str()),
                CompareOp::Lt => q.lt(value.as_str()),
                CompareOp::Lte => q.lte(value.as_str()),
            };
            Ok(Box::new(q))
        }
        Node::Group { nodes, .. } => transpile(nodes),
        Node::Operator(_) => Err(Error::InvalidQuery(
            "operator node is not a builder".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kql::expand::expand;
    use crate::kql::parser::parse;
    use serde_json::json;

    fn run(query: &str) -> serde_json::Value {
        let q = expand(parse(query).unwrap()).unwrap();
        transpile(&q.nodes).unwrap().to_json().unwrap()
    }

    #[test]
    fn single_node_transpiles_directly() {
        let v = run("name:report");
        assert_eq!(v["term"]["Name"]["value"], json!("report"));
    }

    #[test]
    fn a_and_b_or_c_places_must_and_should() {
        let v = run("a AND b OR c");
        let bool_obj = &v["bool"];
        assert_eq!(bool_obj["must"].as_array().unwrap().len(), 1);
        assert_eq!(bool_obj["should"].as_array().unwrap().len(), 2);
        assert_eq!(bool_obj["minimum_should_match"], json!(1));
    }

    #[test]
    fn not_places_must_not() {
        let v = run("a AND NOT b");
        let bool_obj = &v["bool"];
        assert_eq!(bool_obj["must"].as_array().unwrap().len(), 1);
        assert_eq!(bool_obj["must_not"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn wildcard_value_becomes_wildcard_query() {
        let v = run("name:rep*");
        assert_eq!(v["wildcard"]["Name"]["value"], json!("rep*"));
    }

    #[test]
    fn empty_nodes_is_an_error() {
        assert!(transpile(&[]).is_err());
    }

    /// Bare lowercase words, excluding the `AND`/`OR`/`NOT` keywords a
    /// generated word could otherwise collide with (which the parser
    /// would consume as an operator instead of a term, desyncing the
    /// expected clause counts below).
    fn non_keyword_words() -> impl proptest::strategy::Strategy<Value = Vec<String>> {
        proptest::collection::vec("[a-z]{3,8}", 2..6).prop_filter(
            "word must not be a reserved KQL keyword",
            |words| {
                words
                    .iter()
                    .all(|w| !matches!(w.to_ascii_uppercase().as_str(), "AND" | "OR" | "NOT"))
            },
        )
    }

    proptest::proptest! {
        /// §8: a chain of bare terms joined uniformly by AND places every
        /// term in `must` and leaves `should`/`must_not` empty, regardless
        /// of chain length — the sticky-clause state must never drift off
        /// `Must` when every operator in the chain is `AND`.
        #[test]
        fn all_and_chain_places_every_term_in_must(words in non_keyword_words()) {
            let query = words.join(" AND ");
            let v = run(&query);
            let bool_obj = &v["bool"];
            proptest::prop_assert_eq!(
                bool_obj["must"].as_array().map(|a| a.len()).unwrap_or(0),
                words.len()
            );
            proptest::prop_assert!(bool_obj.get("should").is_none());
            proptest::prop_assert!(bool_obj.get("must_not").is_none());
        }

        /// §8: a chain of bare terms joined uniformly by OR places every
        /// term in `should` with `minimum_should_match == 1`, regardless
        /// of chain length.
        #[test]
        fn all_or_chain_places_every_term_in_should(words in non_keyword_words()) {
            let query = words.join(" OR ");
            let v = run(&query);
            let bool_obj = &v["bool"];
            proptest::prop_assert_eq!(
                bool_obj["should"].as_array().map(|a| a.len()).unwrap_or(0),
                words.len()
            );
            proptest::prop_assert_eq!(bool_obj["minimum_should_match"], json!(1));
            proptest::prop_assert!(bool_obj.get("must").is_none());
        }
    }
}
