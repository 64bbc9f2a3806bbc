//! Parser tests

#[cfg(test)]
mod tests {
    use crate::error::PplError;
    use crate::ppl::ast::*;
    use crate::ppl::lexer::tokenize;
    use crate::ppl::parser::{Parser, parse};
    use crate::value::ScalarValue;

    fn parse_text(text: &str) -> Query {
        parse(tokenize(text).unwrap()).unwrap()
    }

    fn parse_err(text: &str) -> PplError {
        parse(tokenize(text).unwrap()).unwrap_err()
    }

    fn field(name: &str) -> Expr {
        Expr::Field(Ident::new(name))
    }

    fn int(v: i64) -> Expr {
        Expr::Literal {
            value: ScalarValue::Int64(v),
            span: Span::default(),
        }
    }

    fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: Span::default(),
        }
    }

    #[test]
    fn test_search_with_and_without_keyword() {
        let a = parse_text("search source=logs");
        let b = parse_text("source = logs");
        assert_eq!(a, b);
        assert_eq!(a.search.source.name, "logs");
        assert!(a.search.filter.is_none());
    }

    #[test]
    fn test_search_terms_are_anded() {
        let q = parse_text("source=logs status=500 host='a'");
        match q.search.filter {
            Some(Expr::Binary {
                op: BinaryOp::And, ..
            }) => {}
            other => panic!("expected AND filter, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let q = parse_text("source=t | where a = 1 OR b = 2 AND c > 3 + 4 * 5");
        let Command::Where(w) = &q.commands[0] else {
            panic!("expected where");
        };
        let expected = bin(
            BinaryOp::Or,
            bin(BinaryOp::Eq, field("a"), int(1)),
            bin(
                BinaryOp::And,
                bin(BinaryOp::Eq, field("b"), int(2)),
                bin(
                    BinaryOp::Gt,
                    field("c"),
                    bin(BinaryOp::Add, int(3), bin(BinaryOp::Mul, int(4), int(5))),
                ),
            ),
        );
        assert_eq!(w.predicate, expected);
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let q = parse_text("source=t | where NOT a = 1");
        let Command::Where(w) = &q.commands[0] else {
            panic!("expected where");
        };
        assert_eq!(
            w.predicate,
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(bin(BinaryOp::Eq, field("a"), int(1))),
                span: Span::default(),
            }
        );
    }

    #[test]
    fn test_negative_literal_is_folded() {
        let q = parse_text("source=t | where a > -5");
        let Command::Where(w) = &q.commands[0] else {
            panic!("expected where");
        };
        assert_eq!(w.predicate, bin(BinaryOp::Gt, field("a"), int(-5)));
    }

    #[test]
    fn test_i64_min_literal() {
        let q = parse_text("source=t | where a > -9223372036854775808");
        let Command::Where(w) = &q.commands[0] else {
            panic!("expected where");
        };
        assert_eq!(w.predicate, bin(BinaryOp::Gt, field("a"), int(i64::MIN)));
        assert_eq!(parse_text(&q.to_string()), q);

        // without the sign the magnitude does not fit
        assert!(matches!(
            parse_err("source=t | where a > 9223372036854775808"),
            PplError::Parse { .. }
        ));
    }

    #[test]
    fn test_stats_with_alias_and_group_by() {
        let q = parse_text("source=t | stats count() as c, avg(bytes) by host, region");
        let Command::Stats(s) = &q.commands[0] else {
            panic!("expected stats");
        };
        assert_eq!(s.aggregations.len(), 2);
        assert_eq!(s.aggregations[0].function, "count");
        assert_eq!(s.aggregations[0].alias.as_ref().map(|a| a.name.as_str()), Some("c"));
        assert_eq!(s.aggregations[1].args, vec![field("bytes")]);
        let groups: Vec<_> = s.group_by.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(groups, vec!["host", "region"]);
    }

    #[test]
    fn test_count_star() {
        let a = parse_text("source=t | stats count(*)");
        let b = parse_text("source=t | stats count()");
        assert_eq!(a, b);
    }

    #[test]
    fn test_sort_directions() {
        let q = parse_text("source=t | sort - a, b desc, + c asc, d");
        let Command::Sort(s) = &q.commands[0] else {
            panic!("expected sort");
        };
        let dirs: Vec<_> = s.keys.iter().map(|k| k.descending).collect();
        assert_eq!(dirs, vec![true, true, false, false]);
    }

    #[test]
    fn test_head_defaults() {
        let q = parse_text("source=t | head | head 5 from 2");
        assert_eq!(
            q.commands[0],
            Command::Head(HeadCommand {
                count: 10,
                offset: 0,
                span: Span::default()
            })
        );
        assert_eq!(
            q.commands[1],
            Command::Head(HeadCommand {
                count: 5,
                offset: 2,
                span: Span::default()
            })
        );
    }

    #[test]
    fn test_default_head_is_configurable() {
        let mut parser = Parser::new(tokenize("source=t | top host").unwrap()).with_default_head(3);
        let q = parser.parse_query().unwrap();
        let Command::Top(top) = &q.commands[0] else {
            panic!("expected top");
        };
        assert_eq!(top.count, 3);
    }

    #[test]
    fn test_join_variants() {
        let q = parse_text("source=a | left outer join b as r on a.id = r.id");
        let Command::Join(j) = &q.commands[0] else {
            panic!("expected join");
        };
        assert_eq!(j.join_type, JoinType::Left);
        assert_eq!(j.alias.as_ref().map(|a| a.name.as_str()), Some("r"));

        let q = parse_text("source=a | join b on id = bid");
        let Command::Join(j) = &q.commands[0] else {
            panic!("expected join");
        };
        assert_eq!(j.join_type, JoinType::Inner);
    }

    #[test]
    fn test_lookup_parse_and_grok() {
        let q = parse_text(
            r#"source=a | lookup users uid as user_id output name, email | parse msg "(?<code>\d+)" | grok msg '%{IP:client}'"#,
        );
        assert_eq!(q.commands.len(), 3);
        let Command::Lookup(l) = &q.commands[0] else {
            panic!("expected lookup");
        };
        assert_eq!(l.local_key.as_ref().map(|k| k.name.as_str()), Some("user_id"));
        assert_eq!(l.outputs.len(), 2);
        assert_eq!(q.commands[1].name(), "parse");
        assert_eq!(q.commands[2].name(), "grok");
    }

    #[test]
    fn test_soft_keywords_as_field_names() {
        let q = parse_text("source=t | where left = 1 | fields source, output");
        let Command::Fields(f) = &q.commands[1] else {
            panic!("expected fields");
        };
        assert_eq!(f.fields[0].name, "source");
    }

    #[test]
    fn test_round_trip() {
        let queries = [
            "source=logs status=500 | where (a + 1) * 2 >= b OR NOT c | fields - x, y",
            "search source=`my index` | eval z = abs(-x), w = 'q\"' | rename z as `zz z`",
            "source=t | stats count(), sum(b) as s by `where` | sort - s, a | head 3 from 1",
            "source=t | top 4 a, b | full join other as o on t.k = o.k | lookup u id as uid output n",
            "source=t | grok msg \"%{WORD:w}\" | where isnull(w) XOR true AND -(a) < 2.5",
        ];
        for text in queries {
            let ast = parse_text(text);
            let rendered = ast.to_string();
            let reparsed = parse_text(&rendered);
            assert_eq!(ast, reparsed, "round trip changed {text:?} via {rendered:?}");
        }
    }

    #[test]
    fn test_error_positions() {
        match parse_err("source=t | where") {
            PplError::Parse {
                position,
                expected,
                found,
            } => {
                assert_eq!(position.column, 17);
                assert_eq!(expected, "expression");
                assert_eq!(found, "end of input");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(parse_err("where a = 1"), PplError::Parse { .. }));
        assert!(matches!(
            parse_err("source=t | source=u"),
            PplError::Parse { .. }
        ));
        assert!(matches!(parse_err("source=t | stats"), PplError::Parse { .. }));
        assert!(matches!(
            parse_err("source=t | where (a = 1"),
            PplError::Parse { .. }
        ));
    }

    #[test]
    fn test_function_arity_is_not_checked() {
        let q = parse_text("source=t | eval x = abs(a, b, c)");
        let Command::Eval(e) = &q.commands[0] else {
            panic!("expected eval");
        };
        assert!(matches!(&e.assignments[0].1, Expr::Call { args, .. } if args.len() == 3));
    }
}
