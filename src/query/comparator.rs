//! Comparison expressions such as `<0.5`, `>=10` or `~=^rs`.

use std::str::FromStr;

use super::Error;
use crate::storage::{Filter, Pattern};

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '!', '~'];

/// A parsed comparison against a numeric operand or a regular expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparator {
    Lt(f64),
    Lte(f64),
    Gt(f64),
    Gte(f64),
    Eq(f64),
    Ne(f64),
    Regex(Pattern),
}

impl Comparator {
    /// Filter comparing the values at `path`.
    pub fn to_filter(&self, path: &str) -> Filter {
        let path = path.to_string();
        match self {
            Comparator::Lt(x) => Filter::Lt(path, *x),
            Comparator::Lte(x) => Filter::Lte(path, *x),
            Comparator::Gt(x) => Filter::Gt(path, *x),
            Comparator::Gte(x) => Filter::Gte(path, *x),
            Comparator::Eq(x) => Filter::Eq(path, (*x).into()),
            Comparator::Ne(x) => Filter::Ne(path, (*x).into()),
            Comparator::Regex(pattern) => Filter::Regex(path, pattern.clone()),
        }
    }
}

impl FromStr for Comparator {
    type Err = Error;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let expr = expr.trim();
        let op_len = expr
            .chars()
            .take(2)
            .take_while(|c| OPERATOR_CHARS.contains(c))
            .count();
        let (op, operand) = expr.split_at(op_len);

        if op == "~=" {
            return Pattern::new(operand)
                .map(Comparator::Regex)
                .map_err(|e| Error::InvalidRegex {
                    expr: expr.to_string(),
                    msg: e.to_string(),
                });
        }

        let number = || {
            operand
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::InvalidNumber(expr.to_string()))
        };
        match op {
            "<" => Ok(Comparator::Lt(number()?)),
            "<=" => Ok(Comparator::Lte(number()?)),
            ">" => Ok(Comparator::Gt(number()?)),
            ">=" => Ok(Comparator::Gte(number()?)),
            "=" | "==" => Ok(Comparator::Eq(number()?)),
            "!=" => Ok(Comparator::Ne(number()?)),
            _ => Err(Error::UnknownOperator {
                op: op.to_string(),
                expr: expr.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[rstest::rstest]
    #[case("<0.5", Comparator::Lt(0.5))]
    #[case("<=1", Comparator::Lte(1.0))]
    #[case(">3", Comparator::Gt(3.0))]
    #[case(">=0.01", Comparator::Gte(0.01))]
    #[case("=2", Comparator::Eq(2.0))]
    #[case("==2", Comparator::Eq(2.0))]
    #[case("!=0", Comparator::Ne(0.0))]
    #[case(" < 0.5 ", Comparator::Lt(0.5))]
    fn parse(#[case] expr: &str, #[case] expected: Comparator) -> Result<(), anyhow::Error> {
        assert_eq!(expr.parse::<Comparator>()?, expected);
        Ok(())
    }

    #[rstest::rstest]
    #[case("0.5")]
    #[case("=<0.5")]
    #[case("<>1")]
    #[case("")]
    fn unknown_operator(#[case] expr: &str) {
        assert!(matches!(
            expr.parse::<Comparator>(),
            Err(Error::UnknownOperator { .. })
        ));
    }

    #[test]
    fn invalid_number() {
        assert_eq!(
            "<abc".parse::<Comparator>(),
            Err(Error::InvalidNumber(String::from("<abc")))
        );
    }

    #[test]
    fn regex() -> Result<(), anyhow::Error> {
        let filter = "~=^prob".parse::<Comparator>()?.to_filter("desc");

        assert!(filter.matches(&json!({"desc": "probably damaging"})));
        assert!(!filter.matches(&json!({"desc": "benign"})));

        Ok(())
    }

    #[test]
    fn to_filter_compares_numbers() -> Result<(), anyhow::Error> {
        let filter = "<=0.1".parse::<Comparator>()?.to_filter("st.maf");

        assert!(filter.matches(&json!({"st": [{"maf": 0.3}, {"maf": 0.1}]})));
        assert!(!filter.matches(&json!({"st": [{"maf": 0.3}]})));

        Ok(())
    }
}
