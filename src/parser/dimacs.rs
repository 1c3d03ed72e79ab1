use std::collections::BTreeMap;

use nom::{
    bytes::complete::tag,
    character::complete::{i64 as int64, space1, u64 as uint64},
    combinator::rest,
    multi::separated_list1,
    sequence::{preceded, separated_pair, tuple},
    IResult,
};

use crate::errors::{Error, Result};
use crate::instances::{Instance, Rule, VarLit};

/// `c <index> <name>` associating a variable index with a feature name.
fn feature_comment(line: &str) -> IResult<&str, (u64, &str)> {
    preceded(
        tuple((tag("c"), space1)),
        separated_pair(uint64, space1, rest),
    )(line)
}

/// `p cnf <nvars> <nclauses>`
fn problem_header(line: &str) -> IResult<&str, (u64, u64)> {
    preceded(
        tuple((tag("p"), space1, tag("cnf"), space1)),
        separated_pair(uint64, space1, uint64),
    )(line)
}

/// Signed literals terminated by `0`.
fn clause_line(line: &str) -> IResult<&str, Vec<i64>> {
    separated_list1(space1, int64)(line)
}

/// Parse a DIMACS CNF model. Feature names come from the `c`-comments, so
/// every variable must be named; the tree structure stays empty.
pub fn parse_dimacs(source: &str, name: &str) -> Result<Instance> {
    let mut features: BTreeMap<u64, String> = BTreeMap::new();
    let mut rules: Vec<Rule<String>> = Vec::new();
    let mut remaining_clauses: u64 = 0;
    let mut seen_header = false;

    for (line_no, raw_line) in source.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok((_, (index, feature))) = feature_comment(line) {
            let feature = feature.trim();
            if features.values().any(|f| f == feature) {
                return Err(Error::MalformedInput(format!(
                    "feature name is not unique: {feature} (line {})",
                    line_no + 1
                )));
            }
            features.insert(index, feature.to_string());
            continue;
        }
        if line.starts_with('c') {
            continue;
        }
        if let Ok((_, (n_vars, n_clauses))) = problem_header(line) {
            if n_vars as usize != features.len() {
                return Err(Error::MalformedInput(format!(
                    "header declares {n_vars} variables but {} features are named",
                    features.len()
                )));
            }
            remaining_clauses = n_clauses;
            seen_header = true;
            continue;
        }
        if line.starts_with('p') {
            return Err(Error::MalformedInput(format!(
                "unsupported problem line: {line}"
            )));
        }
        if remaining_clauses == 0 {
            continue;
        }
        remaining_clauses -= 1;
        let (_, literals) = clause_line(line).map_err(|_| {
            Error::MalformedInput(format!("invalid clause line {}: {line}", line_no + 1))
        })?;
        let mut vars = Vec::new();
        for literal in literals {
            if literal == 0 {
                break;
            }
            let feature = features.get(&literal.unsigned_abs()).ok_or_else(|| {
                Error::MalformedInput(format!("clause references unnamed variable {literal}"))
            })?;
            let mut var = VarLit::new(feature.clone());
            var.negated = literal < 0;
            vars.push(Rule::Var(var));
        }
        if vars.is_empty() {
            return Err(Error::MalformedInput(format!(
                "empty clause on line {}",
                line_no + 1
            )));
        }
        rules.push(if vars.len() == 1 {
            vars.pop().unwrap()
        } else {
            Rule::Or(vars)
        });
    }

    if !seen_header {
        return Err(Error::MalformedInput("missing `p cnf` header".to_string()));
    }
    Ok(Instance::new(
        name,
        features.into_values().collect(),
        None,
        rules,
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    const SMALL: &str = "c 1 a\nc 2 b\nc 3 c\np cnf 3 2\n1 2 0\n-1 3 0\n";

    #[test]
    fn parses_features_and_clauses() {
        let instance = parse_dimacs(SMALL, "small").unwrap();
        assert_eq!(instance.features, vec!["a", "b", "c"]);
        assert_eq!(instance.rules.len(), 2);
        assert!(instance.structure.is_none());
    }

    #[test]
    fn variable_count_must_match_names() {
        let src = "c 1 a\np cnf 2 1\n1 2 0\n";
        assert!(matches!(
            parse_dimacs(src, "bad"),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn empty_clause_is_rejected() {
        let src = "c 1 a\np cnf 1 1\n0\n";
        assert!(matches!(
            parse_dimacs(src, "bad"),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn duplicate_feature_name_is_rejected() {
        let src = "c 1 a\nc 2 a\np cnf 2 0\n";
        assert!(matches!(
            parse_dimacs(src, "bad"),
            Err(Error::MalformedInput(_))
        ));
    }
}
