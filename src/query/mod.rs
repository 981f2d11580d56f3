//! `imeta qu`: conjunctive attribute/value queries over one target kind.

use std::cmp::Ordering;

use serde::Serialize;

use crate::avu::AvuSet;
use crate::catalog::{Actor, Catalog, TargetKind, path};
use crate::error::CatalogError;
use crate::wildcard::LikePattern;

/// Longest condition text accepted, in bytes.
pub const MAX_CONDITION_LEN: usize = 12 * 1024;

/// Most literals (attributes plus values) a single query may bind.
pub const MAX_BIND_VARS: usize = 4000;

/// Ordering comparators, `=` and `<>` included, go through [`compare`];
/// `in` matches literals as exact strings.
#[derive(Debug, Clone)]
pub enum Comparison {
    Eq(String),
    Ne(String),
    Lt(String),
    Gt(String),
    Le(String),
    Ge(String),
    Like(LikePattern),
    NotLike(LikePattern),
    In(Vec<String>),
    Between(String, String),
}

impl Comparison {
    fn binds(&self) -> usize {
        match self {
            Self::In(values) => values.len(),
            Self::Between(..) => 2,
            _ => 1,
        }
    }

    fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Eq(rhs) => compare(value, rhs) == Ordering::Equal,
            Self::Ne(rhs) => compare(value, rhs) != Ordering::Equal,
            Self::Lt(rhs) => compare(value, rhs) == Ordering::Less,
            Self::Gt(rhs) => compare(value, rhs) == Ordering::Greater,
            Self::Le(rhs) => compare(value, rhs) != Ordering::Greater,
            Self::Ge(rhs) => compare(value, rhs) != Ordering::Less,
            Self::Like(pattern) => pattern.matches(value),
            Self::NotLike(pattern) => !pattern.matches(value),
            Self::In(values) => values.iter().any(|candidate| candidate == value),
            Self::Between(low, high) => {
                compare(value, low) != Ordering::Less && compare(value, high) != Ordering::Greater
            }
        }
    }
}

/// Numeric when both sides parse as numbers, lexicographic otherwise.
pub fn compare(lhs: &str, rhs: &str) -> Ordering {
    match (lhs.trim().parse::<f64>(), rhs.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or_else(|| lhs.cmp(rhs)),
        _ => lhs.cmp(rhs),
    }
}

#[derive(Debug, Clone)]
pub struct Predicate {
    pub attribute: String,
    pub comparison: Comparison,
}

impl Predicate {
    fn satisfied_by(&self, avus: &AvuSet) -> bool {
        avus.with_attribute(&self.attribute)
            .any(|avu| self.comparison.accepts(&avu.value))
    }
}

#[derive(Debug, Clone)]
pub struct Query {
    pub predicates: Vec<Predicate>,
}

/// One row of query output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryHit {
    User { user: String },
    Collection { collection: String },
    DataObject { collection: String, data_object: String },
}

fn invalid(message: impl Into<String>) -> CatalogError {
    CatalogError::InvalidArgument(message.into())
}

/// Split an `in` operand such as `'a' 'b'` into its quoted literals.
fn in_list(operand: &str) -> Vec<String> {
    operand
        .split('\'')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

impl Query {
    /// Parse `attr op value [and attr op value]*`.
    ///
    /// Length limits are enforced before parsing so oversized input fails
    /// with `USER_STRLEN_TOOLONG` rather than a syntax error.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, CatalogError> {
        let tokens: Vec<&str> = tokens.iter().map(|token| token.as_ref()).collect();
        let text_len =
            tokens.iter().map(|t| t.len()).sum::<usize>() + tokens.len().saturating_sub(1);
        if text_len > MAX_CONDITION_LEN {
            return Err(CatalogError::TooLong {
                what: "query condition",
                len: text_len,
                unit: "bytes",
                limit: MAX_CONDITION_LEN,
            });
        }
        if tokens.is_empty() {
            return Err(invalid("query needs at least one condition"));
        }

        let mut predicates = Vec::new();
        let mut rest = tokens.as_slice();
        loop {
            let (predicate, remaining) = parse_predicate(rest)?;
            predicates.push(predicate);
            match remaining {
                [] => break,
                [conj, tail @ ..] if conj.eq_ignore_ascii_case("and") => rest = tail,
                [other, ..] => return Err(invalid(format!("expected 'and', found '{other}'"))),
            }
        }

        let binds: usize = predicates.iter().map(|p| 1 + p.comparison.binds()).sum();
        if binds > MAX_BIND_VARS {
            return Err(CatalogError::TooLong {
                what: "query",
                len: binds,
                unit: "bind variables",
                limit: MAX_BIND_VARS,
            });
        }
        Ok(Self { predicates })
    }

    fn satisfied_by(&self, avus: &AvuSet) -> bool {
        self.predicates.iter().all(|p| p.satisfied_by(avus))
    }

    /// Every target of `kind` the actor may read that satisfies all
    /// predicates, in path/name order.
    pub fn execute(&self, catalog: &Catalog, actor: &Actor, kind: TargetKind) -> Vec<QueryHit> {
        match kind {
            TargetKind::User => catalog
                .users
                .iter()
                .filter(|(_, user)| self.satisfied_by(&user.avus))
                .map(|(name, _)| QueryHit::User {
                    user: catalog.display_name(kind, name),
                })
                .collect(),
            TargetKind::Collection => catalog
                .collections
                .iter()
                .filter(|(key, _)| catalog.can_read(actor, kind, key))
                .filter(|(_, collection)| self.satisfied_by(&collection.avus))
                .map(|(key, _)| QueryHit::Collection {
                    collection: key.clone(),
                })
                .collect(),
            TargetKind::DataObject => catalog
                .data_objects
                .iter()
                .filter(|(key, _)| catalog.can_read(actor, kind, key))
                .filter(|(_, object)| self.satisfied_by(&object.avus))
                .filter_map(|(key, _)| {
                    path::split(key).map(|(collection, name)| QueryHit::DataObject {
                        collection: collection.to_owned(),
                        data_object: name.to_owned(),
                    })
                })
                .collect(),
        }
    }
}

fn parse_predicate<'a, 'b>(tokens: &'b [&'a str]) -> Result<(Predicate, &'b [&'a str]), CatalogError> {
    let [attribute, op, rest @ ..] = tokens else {
        return Err(invalid("incomplete condition; expected 'attr op value'"));
    };
    if attribute.is_empty() {
        return Err(invalid("empty attribute in condition"));
    }

    let (comparison, remaining) = match (op.to_ascii_lowercase().as_str(), rest) {
        ("not", [like, value, tail @ ..]) if like.eq_ignore_ascii_case("like") => {
            (Comparison::NotLike(LikePattern::new(value)), tail)
        }
        ("between", [low, high, tail @ ..]) => {
            (Comparison::Between((*low).to_owned(), (*high).to_owned()), tail)
        }
        ("in", [value, tail @ ..]) => {
            let values = in_list(value);
            if values.is_empty() {
                return Err(invalid("'in' needs at least one quoted value"));
            }
            (Comparison::In(values), tail)
        }
        (operator, [value, tail @ ..]) => {
            let value = (*value).to_owned();
            let comparison = match operator {
                "=" => Comparison::Eq(value),
                "<>" | "!=" => Comparison::Ne(value),
                "<" => Comparison::Lt(value),
                ">" => Comparison::Gt(value),
                "<=" => Comparison::Le(value),
                ">=" => Comparison::Ge(value),
                "like" => Comparison::Like(LikePattern::new(&value)),
                other => return Err(invalid(format!("unknown comparator '{other}'"))),
            };
            (comparison, tail)
        }
        (operator, []) => {
            return Err(invalid(format!("comparator '{operator}' is missing its value")));
        }
    };

    Ok((
        Predicate {
            attribute: (*attribute).to_owned(),
            comparison,
        },
        remaining,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avu::Avu;
    use crate::catalog::{DEFAULT_ADMIN, DEFAULT_ZONE, UserKind};

    fn numbered_catalog() -> (Catalog, Actor) {
        let mut catalog = Catalog::bootstrap(DEFAULT_ZONE, DEFAULT_ADMIN);
        let rods = catalog.actor("rods").unwrap();
        for i in 0..10 {
            let name = format!("obj{i}");
            catalog
                .register_data_object(&rods, &name, 1, "blake3:00", false)
                .unwrap();
            catalog
                .add_avu(
                    &rods,
                    TargetKind::DataObject,
                    &name,
                    Avu::new("n", &i.to_string(), None).unwrap(),
                )
                .unwrap();
        }
        (catalog, rods)
    }

    fn names(hits: &[QueryHit]) -> Vec<String> {
        hits.iter()
            .map(|hit| match hit {
                QueryHit::DataObject { data_object, .. } => data_object.clone(),
                QueryHit::Collection { collection } => collection.clone(),
                QueryHit::User { user } => user.clone(),
            })
            .collect()
    }

    #[test]
    fn numeric_comparison_is_not_lexicographic() {
        assert_eq!(compare("10", "8"), Ordering::Greater);
        assert_eq!(compare("2.0", "2"), Ordering::Equal);
        assert_eq!(compare("abc", "abd"), Ordering::Less);
        assert_eq!(compare("10", "abc"), Ordering::Less);
    }

    #[test]
    fn equality_is_numeric_but_in_is_textual() {
        let (catalog, rods) = numbered_catalog();
        let equal = Query::parse(&["n", "=", "2.0"])
            .unwrap()
            .execute(&catalog, &rods, TargetKind::DataObject);
        assert_eq!(names(&equal), vec!["obj2"]);

        let listed = Query::parse(&["n", "in", "'2.0'"])
            .unwrap()
            .execute(&catalog, &rods, TargetKind::DataObject);
        assert!(listed.is_empty());

        let unequal = Query::parse(&["n", "<>", "2.0"])
            .unwrap()
            .execute(&catalog, &rods, TargetKind::DataObject);
        assert_eq!(unequal.len(), 9);
    }

    #[test]
    fn range_conjunction_returns_exact_set() {
        let (catalog, rods) = numbered_catalog();
        let query = Query::parse(&["n", "<=", "8", "and", "n", ">=", "2"]).unwrap();
        let hits = query.execute(&catalog, &rods, TargetKind::DataObject);
        let expected: Vec<String> = (2..=8).map(|i| format!("obj{i}")).collect();
        assert_eq!(names(&hits), expected);
    }

    #[test]
    fn between_and_not_like() {
        let (catalog, rods) = numbered_catalog();
        let hits = Query::parse(&["n", "between", "3", "4"])
            .unwrap()
            .execute(&catalog, &rods, TargetKind::DataObject);
        assert_eq!(names(&hits), vec!["obj3", "obj4"]);

        let hits = Query::parse(&["n", "not", "like", "%1%"])
            .unwrap()
            .execute(&catalog, &rods, TargetKind::DataObject);
        assert_eq!(hits.len(), 9);
    }

    #[test]
    fn in_list_splits_quoted_literals() {
        assert_eq!(in_list("'a' 'b'"), vec!["a", "b"]);
        assert_eq!(in_list("1''1''v"), vec!["1", "1", "v"]);

        let (catalog, rods) = numbered_catalog();
        let hits = Query::parse(&["n", "in", "'3' '7' 'x'"])
            .unwrap()
            .execute(&catalog, &rods, TargetKind::DataObject);
        assert_eq!(names(&hits), vec!["obj3", "obj7"]);
    }

    #[test]
    fn oversized_condition_is_too_long() {
        let operand = format!("1'{}'v", "'1'".repeat(10_000));
        let err = Query::parse(&["a", "in", operand.as_str()]).unwrap_err();
        assert!(matches!(err, CatalogError::TooLong { unit: "bytes", .. }));
        assert!(err.to_string().starts_with("query condition has "));
        assert_eq!(err.code().as_str(), "USER_STRLEN_TOOLONG");
    }

    #[test]
    fn many_bind_variables_within_limits_parse() {
        let operand = format!("1'{}'v", "'1'".repeat(607));
        let query = Query::parse(&["a", "in", operand.as_str()]).unwrap();
        assert_eq!(query.predicates.len(), 1);
    }

    #[test]
    fn bind_variable_limit_is_enforced_independently_of_length() {
        let operand = "'1'".repeat(MAX_BIND_VARS + 1);
        assert!(operand.len() <= MAX_CONDITION_LEN);
        let err = Query::parse(&["a", "in", operand.as_str()]).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::TooLong {
                unit: "bind variables",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            format!("query has {} bind variables, limit is {MAX_BIND_VARS}", MAX_BIND_VARS + 1)
        );
    }

    #[test]
    fn malformed_conditions_are_invalid_arguments() {
        for tokens in [
            vec![],
            vec!["a"],
            vec!["a", "="],
            vec!["a", "~", "1"],
            vec!["a", "=", "1", "or", "b", "=", "2"],
            vec!["a", "in", "''"],
        ] {
            let err = Query::parse(tokens.as_slice()).unwrap_err();
            assert!(
                matches!(err, CatalogError::InvalidArgument(_)),
                "{tokens:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn unreadable_targets_are_filtered_for_rodsusers() {
        let (mut catalog, rods) = numbered_catalog();
        catalog.create_user(&rods, "alice", UserKind::RodsUser).unwrap();
        let alice = catalog.actor("alice").unwrap();

        let query = Query::parse(&["n", ">=", "0"]).unwrap();
        assert!(query.execute(&catalog, &alice, TargetKind::DataObject).is_empty());
        assert_eq!(query.execute(&catalog, &rods, TargetKind::DataObject).len(), 10);
    }

    #[test]
    fn user_queries_report_zone_qualified_names() {
        let mut catalog = Catalog::bootstrap(DEFAULT_ZONE, DEFAULT_ADMIN);
        let rods = catalog.actor("rods").unwrap();
        catalog
            .add_avu(&rods, TargetKind::User, "rods", Avu::new("role", "ops", None).unwrap())
            .unwrap();

        let hits = Query::parse(&["role", "=", "ops"])
            .unwrap()
            .execute(&catalog, &rods, TargetKind::User);
        assert_eq!(
            hits,
            vec![QueryHit::User {
                user: "rods#tempZone".to_owned()
            }]
        );
    }
}
