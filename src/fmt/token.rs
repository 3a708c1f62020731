//! SQL tokenizer using nom.
//!
//! Only surface structure matters to the formatter, so tokens borrow their
//! text from the input and whitespace is dropped.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, take_until, take_while, take_while1},
    character::complete::{char, digit0, digit1, not_line_ending, one_of},
    combinator::{map, not, opt, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
};

use super::FormatError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'a> {
    Word(&'a str),
    QuotedIdent(&'a str),
    Str(&'a str),
    Number(&'a str),
    Param(&'a str),
    Operator(&'a str),
    LineComment(&'a str),
    BlockComment(&'a str),
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Comma,
    Semicolon,
    Dot,
}

impl<'a> Token<'a> {
    /// Source text of the token.
    pub fn text(&self) -> &'a str {
        match self {
            Token::Word(s)
            | Token::QuotedIdent(s)
            | Token::Str(s)
            | Token::Number(s)
            | Token::Param(s)
            | Token::Operator(s)
            | Token::LineComment(s)
            | Token::BlockComment(s) => s,
            Token::OpenParen => "(",
            Token::CloseParen => ")",
            Token::OpenBracket => "[",
            Token::CloseBracket => "]",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Dot => ".",
        }
    }

    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(word))
    }
}

/// A token together with its byte offset in the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spanned<'a> {
    pub token: Token<'a>,
    pub offset: usize,
}

/// Split a query into tokens, dropping whitespace.
pub fn tokenize(input: &str) -> Result<Vec<Spanned<'_>>, FormatError> {
    let mut tokens = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let offset = input.len() - rest.len();
        if rest.starts_with("/*") && !rest[2..].contains("*/") {
            return Err(FormatError::new(offset, "unterminated block comment"));
        }
        match parse_token(rest) {
            Ok((remaining, token)) => {
                tokens.push(Spanned { token, offset });
                rest = remaining;
            }
            Err(_) => return Err(FormatError::new(offset, describe_failure(rest))),
        }
    }

    Ok(tokens)
}

fn describe_failure(rest: &str) -> String {
    if rest.starts_with('\'') {
        "unterminated string literal".to_string()
    } else if dollar_delimiter(rest).is_ok() {
        "unterminated dollar-quoted string".to_string()
    } else if rest.starts_with('"') {
        "unterminated quoted identifier".to_string()
    } else {
        let c = rest.chars().next().unwrap_or(' ');
        format!("unexpected character '{}'", c)
    }
}

fn parse_token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(line_comment, Token::LineComment),
        map(block_comment, Token::BlockComment),
        map(string_literal, Token::Str),
        map(dollar_quoted, Token::Str),
        map(quoted_ident, Token::QuotedIdent),
        map(number, Token::Number),
        map(word, Token::Word),
        map(param, Token::Param),
        map(operator, Token::Operator),
        punctuation,
    ))(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("--"), not_line_ending))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

/// `'...'` with `''` as the escaped quote.
fn string_literal(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('\''),
        many0(alt((tag("''"), is_not("'")))),
        char('\''),
    ))(input)
}

/// `"..."` with `""` as the escaped quote.
fn quoted_ident(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('"'),
        many0(alt((tag("\"\""), is_not("\"")))),
        char('"'),
    ))(input)
}

/// `$tag$` opening a dollar-quoted string; the tag may be empty.
fn dollar_delimiter(input: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('$'),
        opt(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
        char('$'),
    ))(input)
}

/// `$$...$$` or `$tag$...$tag$`, body taken verbatim.
fn dollar_quoted(input: &str) -> IResult<&str, &str> {
    let (rest, delimiter) = dollar_delimiter(input)?;
    let body: IResult<&str, (&str, &str)> = pair(take_until(delimiter), tag(delimiter))(rest);
    let (rest, _) = body?;
    Ok((rest, &input[..input.len() - rest.len()]))
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(pair(digit1, opt(pair(char('.'), digit0))))(input)
}

fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$'),
    ))(input)
}

/// `$1`, `:name`, `@name` and `?`.
fn param(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(preceded(char('$'), digit1)),
        recognize(preceded(
            pair(one_of(":@"), not(one_of(":>"))),
            take_while1(|c: char| c.is_alphanumeric() || c == '_'),
        )),
        tag("?"),
    ))(input)
}

fn operator(input: &str) -> IResult<&str, &str> {
    alt((
        alt((
            tag("::"),
            tag("->>"),
            tag("->"),
            tag("#>>"),
            tag("#>"),
            tag("<="),
            tag(">="),
            tag("<>"),
            tag("!="),
            tag("||"),
            tag("@>"),
            tag("<@"),
            tag("&&"),
        )),
        recognize(one_of("+-*/%=<>!|&^~#:")),
    ))(input)
}

fn punctuation(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(char('('), |_| Token::OpenParen),
        map(char(')'), |_| Token::CloseParen),
        map(char('['), |_| Token::OpenBracket),
        map(char(']'), |_| Token::CloseBracket),
        map(char(','), |_| Token::Comma),
        map(char(';'), |_| Token::Semicolon),
        map(char('.'), |_| Token::Dot),
    ))(input)
}
