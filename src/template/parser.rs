//! Template parser using nom.
//!
//! Parsing runs in two passes. The scanner splits the source into text,
//! `{{ output }}` and `{% tag %}` tokens (dropping `{# comments #}`), then
//! the tree builder nests `if`/`for` blocks. Tag contents are parsed with nom.
//!
//! ```text
//! {% for column in inputColumns %}
//!     input.{{ column | quoteIdentifier }} AS {{ snapshotInputColumns[loop.index0] | quoteIdentifier }}
//! {% endfor %}
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{all_consuming, map, map_res, opt, recognize, value, verify},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use std::fmt;

/// Parse failure: line number and message.
pub(crate) type ParseError = (usize, String);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Path { root: String, segments: Vec<Segment> },
    Str(String),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Key(String),
    Index(usize),
    Lookup(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cond {
    Test(Expr),
    Eq(Expr, Expr),
    Ne(Expr, Expr),
    Not(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tag {
    If(Cond),
    Elif(Cond),
    Else,
    EndIf,
    For { var: String, iterable: Expr },
    EndFor,
}

impl Tag {
    fn keyword(&self) -> &'static str {
        match self {
            Tag::If(_) => "if",
            Tag::Elif(_) => "elif",
            Tag::Else => "else",
            Tag::EndIf => "endif",
            Tag::For { .. } => "for",
            Tag::EndFor => "endfor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Branch {
    pub line: usize,
    pub cond: Cond,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Output {
        line: usize,
        expr: Expr,
        filters: Vec<FilterCall>,
    },
    If {
        branches: Vec<Branch>,
        otherwise: Vec<Node>,
    },
    For {
        line: usize,
        var: String,
        iterable: Expr,
        body: Vec<Node>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Path { root, segments } => {
                write!(f, "{}", root)?;
                for segment in segments {
                    match segment {
                        Segment::Key(k) => write!(f, ".{}", k)?,
                        Segment::Index(i) => write!(f, ".{}", i)?,
                        Segment::Lookup(e) => write!(f, "[{}]", e)?,
                    }
                }
                Ok(())
            }
            Expr::Str(s) => write!(f, "\"{}\"", s),
            Expr::Int(n) => write!(f, "{}", n),
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token<'a> {
    Text(&'a str),
    Output(&'a str),
    Tag(&'a str),
}

const DELIMITERS: [(&str, &str); 3] = [("{{", "}}"), ("{%", "%}"), ("{#", "#}")];

fn line_at(src: &str, offset: usize) -> usize {
    src[..offset].matches('\n').count() + 1
}

fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t' || c == '\r')
}

/// Split template source into tokens tagged with their line numbers.
///
/// A block tag or comment alone on its line swallows the whole line,
/// including the line break.
pub(crate) fn tokenize(src: &str) -> Result<Vec<(usize, Token<'_>)>, ParseError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < src.len() {
        let rest = &src[pos..];
        let next = DELIMITERS
            .iter()
            .filter_map(|(open, close)| rest.find(open).map(|i| (i, *open, *close)))
            .min_by_key(|(i, _, _)| *i);

        let Some((start, open, close)) = next else {
            tokens.push((line_at(src, pos), Token::Text(rest)));
            break;
        };

        let open_at = pos + start;
        let inner_start = open_at + open.len();
        let inner_len = src[inner_start..].find(close).ok_or_else(|| {
            (
                line_at(src, open_at),
                format!("Unclosed \"{}\", expected \"{}\"", open, close),
            )
        })?;
        let inner = &src[inner_start..inner_start + inner_len];
        let mut end = inner_start + inner_len + close.len();
        let mut text_end = open_at;

        if open != "{{" {
            let line_start = src[..open_at].rfind('\n').map_or(0, |i| i + 1);
            let line_end = src[end..].find('\n').map_or(src.len(), |i| end + i);
            if line_start >= pos && is_blank(&src[line_start..open_at]) && is_blank(&src[end..line_end]) {
                text_end = line_start;
                end = (line_end + 1).min(src.len());
            }
        }

        if text_end > pos {
            tokens.push((line_at(src, pos), Token::Text(&src[pos..text_end])));
        }

        let line = line_at(src, open_at);
        match open {
            "{{" => tokens.push((line, Token::Output(inner))),
            "{%" => tokens.push((line, Token::Tag(inner))),
            _ => {}
        }

        pos = end;
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Expression grammar
// ---------------------------------------------------------------------------

fn identifier(input: &str) -> IResult<&str, &str> {
    verify(
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
        |s: &str| !s.starts_with(|c: char| c.is_ascii_digit()),
    )(input)
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        )),
        str::to_string,
    )(input)
}

fn int_literal(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| s.parse::<i64>())(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        preceded(
            char('.'),
            alt((
                map_res(digit1, |d: &str| d.parse::<usize>().map(Segment::Index)),
                map(identifier, |k| Segment::Key(k.to_string())),
            )),
        ),
        map(delimited(char('['), ws(expr), char(']')), Segment::Lookup),
    ))(input)
}

fn path(input: &str) -> IResult<&str, Expr> {
    let (input, root) = identifier(input)?;
    let (input, segments) = many0(segment)(input)?;
    Ok((
        input,
        Expr::Path {
            root: root.to_string(),
            segments,
        },
    ))
}

fn expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(string_literal, Expr::Str),
        map(int_literal, Expr::Int),
        path,
    ))(input)
}

fn filter_call(input: &str) -> IResult<&str, FilterCall> {
    let (input, name) = identifier(input)?;
    let (input, args) = opt(delimited(
        char('('),
        separated_list0(char(','), ws(expr)),
        char(')'),
    ))(input)?;
    Ok((
        input,
        FilterCall {
            name: name.to_string(),
            args: args.unwrap_or_default(),
        },
    ))
}

fn output(input: &str) -> IResult<&str, (Expr, Vec<FilterCall>)> {
    pair(ws(expr), many0(preceded(char('|'), ws(filter_call))))(input)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), multispace1)
}

fn comparison(input: &str) -> IResult<&str, Cond> {
    let (input, left) = ws(expr)(input)?;
    let (input, op) = opt(pair(alt((tag("=="), tag("!="))), ws(expr)))(input)?;
    let cond = match op {
        Some(("==", right)) => Cond::Eq(left, right),
        Some((_, right)) => Cond::Ne(left, right),
        None => Cond::Test(left),
    };
    Ok((input, cond))
}

fn unary(input: &str) -> IResult<&str, Cond> {
    alt((
        map(preceded(ws(keyword("not")), unary), |c| Cond::Not(Box::new(c))),
        delimited(ws(char('(')), or_cond, ws(char(')'))),
        comparison,
    ))(input)
}

fn and_cond(input: &str) -> IResult<&str, Cond> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(preceded(keyword("and"), unary))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, c| Cond::And(Box::new(acc), Box::new(c))),
    ))
}

fn or_cond(input: &str) -> IResult<&str, Cond> {
    let (input, first) = and_cond(input)?;
    let (input, rest) = many0(preceded(keyword("or"), and_cond))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, c| Cond::Or(Box::new(acc), Box::new(c))),
    ))
}

fn tag_statement(input: &str) -> IResult<&str, Tag> {
    ws(alt((
        value(Tag::EndIf, tag("endif")),
        value(Tag::EndFor, tag("endfor")),
        map(preceded(keyword("elif"), or_cond), Tag::Elif),
        value(Tag::Else, tag("else")),
        map(preceded(keyword("if"), or_cond), Tag::If),
        map(
            tuple((
                keyword("for"),
                identifier,
                multispace1,
                keyword("in"),
                expr,
            )),
            |(_, var, _, _, iterable)| Tag::For {
                var: var.to_string(),
                iterable,
            },
        ),
    )))(input)
}

pub(crate) fn parse_output(src: &str) -> Result<(Expr, Vec<FilterCall>), String> {
    all_consuming(output)(src)
        .map(|(_, parsed)| parsed)
        .map_err(|_| format!("Invalid expression \"{}\"", src.trim()))
}

pub(crate) fn parse_tag(src: &str) -> Result<Tag, String> {
    all_consuming(tag_statement)(src)
        .map(|(_, parsed)| parsed)
        .map_err(|_| format!("Invalid tag \"{}\"", src.trim()))
}

// ---------------------------------------------------------------------------
// Tree builder
// ---------------------------------------------------------------------------

type Tokens<'a> = std::vec::IntoIter<(usize, Token<'a>)>;

/// Parse template source into a node tree.
pub(crate) fn parse_template(src: &str) -> Result<Vec<Node>, ParseError> {
    let mut tokens = tokenize(src)?.into_iter();
    match parse_nodes(&mut tokens)? {
        (nodes, None) => Ok(nodes),
        (_, Some((line, tag))) => Err((line, format!("Unexpected \"{}\"", tag.keyword()))),
    }
}

/// Parse nodes until a closing tag (`elif`, `else`, `endif`, `endfor`) or
/// the end of input. The closing tag is returned to the caller.
fn parse_nodes(tokens: &mut Tokens<'_>) -> Result<(Vec<Node>, Option<(usize, Tag)>), ParseError> {
    let mut nodes = Vec::new();

    while let Some((line, token)) = tokens.next() {
        match token {
            Token::Text(text) => nodes.push(Node::Text(text.to_string())),
            Token::Output(src) => {
                let (expr, filters) = parse_output(src).map_err(|m| (line, m))?;
                nodes.push(Node::Output { line, expr, filters });
            }
            Token::Tag(src) => match parse_tag(src).map_err(|m| (line, m))? {
                Tag::If(cond) => nodes.push(parse_if(tokens, line, cond)?),
                Tag::For { var, iterable } => match parse_nodes(tokens)? {
                    (body, Some((_, Tag::EndFor))) => nodes.push(Node::For {
                        line,
                        var,
                        iterable,
                        body,
                    }),
                    (_, found) => return Err(unclosed(line, "for", found)),
                },
                closing => return Ok((nodes, Some((line, closing)))),
            },
        }
    }

    Ok((nodes, None))
}

fn parse_if(tokens: &mut Tokens<'_>, line: usize, cond: Cond) -> Result<Node, ParseError> {
    let mut branches = Vec::new();
    let mut branch_line = line;
    let mut cond = cond;

    loop {
        let (body, end) = parse_nodes(tokens)?;
        branches.push(Branch {
            line: branch_line,
            cond,
            body,
        });
        match end {
            Some((elif_line, Tag::Elif(next))) => {
                branch_line = elif_line;
                cond = next;
            }
            Some((_, Tag::EndIf)) => {
                return Ok(Node::If {
                    branches,
                    otherwise: Vec::new(),
                })
            }
            Some((_, Tag::Else)) => {
                return match parse_nodes(tokens)? {
                    (otherwise, Some((_, Tag::EndIf))) => Ok(Node::If { branches, otherwise }),
                    (_, found) => Err(unclosed(line, "if", found)),
                }
            }
            found => return Err(unclosed(line, "if", found)),
        }
    }
}

fn unclosed(line: usize, block: &str, found: Option<(usize, Tag)>) -> ParseError {
    match found {
        None => (line, format!("Unclosed \"{}\" block", block)),
        Some((found_line, tag)) => (
            found_line,
            format!("Unexpected \"{}\" inside \"{}\" block", tag.keyword(), block),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_expr(root: &str, segments: Vec<Segment>) -> Expr {
        Expr::Path {
            root: root.to_string(),
            segments,
        }
    }

    #[test]
    fn test_tokenize_output_and_text() {
        let tokens = tokenize("SELECT {{ a }} FROM t").unwrap();
        assert_eq!(
            tokens,
            vec![
                (1, Token::Text("SELECT ")),
                (1, Token::Output(" a ")),
                (1, Token::Text(" FROM t")),
            ]
        );
    }

    #[test]
    fn test_standalone_tag_swallows_line() {
        let tokens = tokenize("a\n  {% if x %}  \nb\n{% endif %}\nc").unwrap();
        assert_eq!(
            tokens,
            vec![
                (1, Token::Text("a\n")),
                (2, Token::Tag(" if x ")),
                (3, Token::Text("b\n")),
                (4, Token::Tag(" endif ")),
                (5, Token::Text("c")),
            ]
        );
    }

    #[test]
    fn test_inline_tag_keeps_surrounding_text() {
        let tokens = tokenize("x{% if a %},{% endif %}\n").unwrap();
        assert_eq!(
            tokens,
            vec![
                (1, Token::Text("x")),
                (1, Token::Tag(" if a ")),
                (1, Token::Text(",")),
                (1, Token::Tag(" endif ")),
                (1, Token::Text("\n")),
            ]
        );
    }

    #[test]
    fn test_comments_are_dropped() {
        let tokens = tokenize("{# header #}\nSELECT 1;{# trailing #}").unwrap();
        assert_eq!(tokens, vec![(2, Token::Text("SELECT 1;"))]);
    }

    #[test]
    fn test_unclosed_delimiter() {
        let err = tokenize("a\nb {{ c").unwrap_err();
        assert_eq!(err.0, 2);
    }

    #[test]
    fn test_parse_output_with_filters() {
        let (expr, filters) = parse_output(" columns | quoteIdentifier | join(\", \") ").unwrap();
        assert_eq!(expr, path_expr("columns", vec![]));
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].name, "quoteIdentifier");
        assert_eq!(filters[1].args, vec![Expr::Str(", ".to_string())]);
    }

    #[test]
    fn test_parse_paths() {
        let (expr, _) = parse_output("a.b.1[loop.index0]").unwrap();
        assert_eq!(
            expr,
            path_expr(
                "a",
                vec![
                    Segment::Key("b".to_string()),
                    Segment::Index(1),
                    Segment::Lookup(path_expr("loop", vec![Segment::Key("index0".to_string())])),
                ]
            )
        );
        assert_eq!(expr.to_string(), "a.b.1[loop.index0]");
    }

    #[test]
    fn test_string_literal_may_contain_pipe() {
        let (_, filters) = parse_output("cols | join(\" || '|' || \")").unwrap();
        assert_eq!(filters[0].args, vec![Expr::Str(" || '|' || ".to_string())]);
    }

    #[test]
    fn test_parse_conditions() {
        assert_eq!(
            parse_tag(" if not a and b or c == 'x' ").unwrap(),
            Tag::If(Cond::Or(
                Box::new(Cond::And(
                    Box::new(Cond::Not(Box::new(Cond::Test(path_expr("a", vec![]))))),
                    Box::new(Cond::Test(path_expr("b", vec![]))),
                )),
                Box::new(Cond::Eq(path_expr("c", vec![]), Expr::Str("x".to_string()))),
            ))
        );
        assert_eq!(
            parse_tag("if nothing").unwrap(),
            Tag::If(Cond::Test(path_expr("nothing", vec![])))
        );
    }

    #[test]
    fn test_parse_for_tag() {
        assert_eq!(
            parse_tag(" for column in inputColumns ").unwrap(),
            Tag::For {
                var: "column".to_string(),
                iterable: path_expr("inputColumns", vec![]),
            }
        );
        assert!(parse_tag("for column inputColumns").is_err());
        assert!(parse_tag("while x").is_err());
    }

    #[test]
    fn test_tree_nesting() {
        let nodes = parse_template("{% for x in xs %}{% if x %}a{% elif y %}b{% else %}c{% endif %}{% endfor %}")
            .unwrap();
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            Node::For { body, .. } => match &body[0] {
                Node::If { branches, otherwise } => {
                    assert_eq!(branches.len(), 2);
                    assert_eq!(otherwise, &vec![Node::Text("c".to_string())]);
                }
                other => panic!("expected if, got {:?}", other),
            },
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_unbalanced_blocks() {
        assert_eq!(
            parse_template("a\n{% if x %}\nb").unwrap_err(),
            (2, "Unclosed \"if\" block".to_string())
        );
        assert_eq!(
            parse_template("{% for x in xs %}\n{% endif %}\n").unwrap_err(),
            (2, "Unexpected \"endif\" inside \"for\" block".to_string())
        );
        assert_eq!(
            parse_template("{% endfor %}").unwrap_err().1,
            "Unexpected \"endfor\""
        );
    }
}
