//! Splitting a multi-operation document into one document per operation.

use crate::document::ExecutableDocument;
use crate::validation::collect_spreads;
use batchql_syntax::ast::{Definition, Document};
use rustc_hash::{FxHashMap, FxHashSet};

/// Returns one document per operation, in document order. Each document
/// holds the operation and every fragment it references, directly or
/// through other fragments, in their original order.
pub fn split_operations(document: &ExecutableDocument) -> Vec<ExecutableDocument> {
    let ast = document.ast();
    let fragments: FxHashMap<&str, _> = ast
        .fragments()
        .map(|fragment| (fragment.name.as_str(), fragment))
        .collect();

    ast.definitions
        .iter()
        .filter_map(|definition| match definition {
            Definition::Operation(operation) => Some(operation),
            _ => None,
        })
        .map(|operation| {
            let mut referenced = FxHashSet::default();
            collect_spreads(&operation.selection_set, &fragments, &mut referenced);

            let definitions = ast
                .definitions
                .iter()
                .filter(|definition| match definition {
                    Definition::Operation(other) => std::ptr::eq(other, operation),
                    Definition::Fragment(fragment) => {
                        referenced.contains(fragment.name.as_str())
                    }
                    _ => false,
                })
                .cloned()
                .collect();

            ExecutableDocument::new(
                document.shared_source(),
                Document {
                    definitions,
                    span: operation.span,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(document: &ExecutableDocument) -> Vec<String> {
        document
            .ast()
            .definitions
            .iter()
            .map(|definition| match definition {
                Definition::Operation(op) => format!("op:{}", op.name().unwrap_or("anon")),
                Definition::Fragment(fragment) => format!("fragment:{}", fragment.name.value),
                _ => "other".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_split_keeps_document_order() {
        let document = ExecutableDocument::parse(
            r#"
            query a { ping }
            mutation b { touch }
            subscription c { count }
        "#,
        )
        .unwrap();

        let split = split_operations(&document);
        let shapes: Vec<_> = split.iter().map(shape).collect();
        assert_eq!(
            shapes,
            vec![vec!["op:a"], vec!["op:b"], vec!["op:c"]]
        );
    }

    #[test]
    fn test_split_includes_transitive_fragments() {
        let document = ExecutableDocument::parse(
            r#"
            fragment Leaf on User { id }
            query a { user { ...Branch } }
            fragment Branch on User { ...Leaf friends { ...Leaf } }
            query b { ping }
            fragment Unrelated on User { name }
        "#,
        )
        .unwrap();

        let split = split_operations(&document);
        assert_eq!(shape(&split[0]), vec!["fragment:Leaf", "op:a", "fragment:Branch"]);
        assert_eq!(shape(&split[1]), vec!["op:b"]);
    }

    #[test]
    fn test_split_documents_keep_source_locations() {
        let document = ExecutableDocument::parse("query a { ping }\nquery b { pong }").unwrap();
        let split = split_operations(&document);
        let op = split[1].operations().next().unwrap();
        assert_eq!(split[1].locate(op.span).line, 2);
    }
}
