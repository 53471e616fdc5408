use std::fmt::{Debug, Display, Formatter};

use nom::character::complete::satisfy;
use nom::combinator::{all_consuming, map, map_res};
use nom::error::{ErrorKind, FromExternalError, ParseError};
use nom::multi::many0;
use nom::sequence::tuple;
use nom::{AsChar, IResult, Parser};

pub enum ParserError<I> {
    Custom(anyhow::Error),
    Nom(I, ErrorKind),
    Context(I, &'static str, Box<ParserError<I>>),
}

impl<I: Debug> Debug for ParserError<I> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Custom(error) => f.write_fmt(format_args!("Semantic error at {error}")),
            Self::Nom(input, error) => f.write_fmt(format_args!(
                "Parser error at {input:?}: expecting {error:?}"
            )),
            Self::Context(input, context, _) => {
                f.write_fmt(format_args!("Expected {context} at {input:?}"))
            }
        }
    }
}

impl<I> ParseError<I> for ParserError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        ParserError::Nom(input, kind)
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I> nom::error::ContextError<I> for ParserError<I> {
    fn add_context(input: I, context: &'static str, other: Self) -> Self {
        match other {
            // Keep the innermost semantic error, it is the most descriptive one
            error @ ParserError::Custom(_) => error,
            other => ParserError::Context(input, context, Box::new(other)),
        }
    }
}

impl<I> nom_supreme::context::ContextError<I, &'static str> for ParserError<I> {
    fn add_context(location: I, ctx: &'static str, other: Self) -> Self {
        <Self as nom::error::ContextError<I>>::add_context(location, ctx, other)
    }
}

impl<I: Display, E: Into<anyhow::Error>> FromExternalError<I, E> for ParserError<I> {
    fn from_external_error(input: I, _: ErrorKind, error: E) -> Self {
        ParserError::Custom(anyhow::anyhow!("'{}': {}", input, error.into()))
    }
}

pub(crate) fn format_parse_error<I: Debug>(error: nom::Err<ParserError<I>>) -> anyhow::Error {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => anyhow::anyhow!("{:?}", e),
        _ => anyhow::anyhow!(error.to_string()),
    }
}

pub type NomResult<'a, Ret> = IResult<&'a str, Ret, ParserError<&'a str>>;

/// Runs `parser` on the whole `input` and converts a failure into a readable error.
pub fn consume_all<'a, O, P>(parser: P, input: &'a str) -> anyhow::Result<O>
where
    P: Parser<&'a str, O, ParserError<&'a str>>,
{
    all_consuming(parser)(input)
        .map(|(_, output)| output)
        .map_err(format_parse_error)
}

fn p_integer_string(input: &str) -> NomResult<String> {
    let parser = tuple((
        satisfy(|c| c.is_dec_digit()),
        many0(satisfy(|c| c.is_dec_digit() || c == '_')),
    ));
    map(parser, |(first, rest)| {
        let mut number = first.to_string();
        number.extend(rest.into_iter().filter(|c| c.is_dec_digit()));
        number
    })(input)
}

pub fn p_u32(input: &str) -> NomResult<u32> {
    map_res(p_integer_string, |number| number.parse::<u32>())(input)
}
