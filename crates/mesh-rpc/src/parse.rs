//! Parser for the textual type syntax used in manifests and the CLI.
//!
//! ```text
//! type     := base ("[" "]")*
//! base     := "?" (("extends" | "super") type)?
//!           | ident ("<" type ("," type)* ">")?
//! param    := ident ("extends" type ("&" type)*)?
//! ```
//!
//! Identifiers that name a primitive become `Prim`, identifiers listed in
//! the variable scope become `Var`, and everything else is a class.

use thiserror::Error;

use crate::ty::{Prim, TypeExpr, TypeParam, Wildcard};

/// A type expression that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid type {src:?}: {message} at offset {pos}")]
pub struct ParseTypeError {
    pub src: String,
    pub pos: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok<'s> {
    Ident(&'s str),
    Lt,
    Gt,
    Comma,
    LBracket,
    RBracket,
    Question,
    Amp,
}

struct Parser<'s, 'v> {
    src: &'s str,
    toks: Vec<(usize, Tok<'s>)>,
    pos: usize,
    vars: &'v [&'v str],
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '.'
}

fn lex(src: &str) -> Result<Vec<(usize, Tok<'_>)>, ParseTypeError> {
    let mut toks = Vec::new();
    let mut chars = src.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        let tok = match c {
            c if c.is_whitespace() => continue,
            '<' => Tok::Lt,
            '>' => Tok::Gt,
            ',' => Tok::Comma,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            '?' => Tok::Question,
            '&' => Tok::Amp,
            c if is_ident_start(c) => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, n)) = chars.peek() {
                    if !is_ident_continue(n) {
                        break;
                    }
                    end = i + n.len_utf8();
                    chars.next();
                }
                Tok::Ident(&src[start..end])
            }
            other => {
                return Err(ParseTypeError {
                    src: src.to_string(),
                    pos: start,
                    message: format!("unexpected character {other:?}"),
                })
            }
        };
        toks.push((start, tok));
    }
    Ok(toks)
}

impl<'s, 'v> Parser<'s, 'v> {
    fn new(src: &'s str, vars: &'v [&'v str]) -> Result<Self, ParseTypeError> {
        Ok(Parser {
            src,
            toks: lex(src)?,
            pos: 0,
            vars,
        })
    }

    fn error(&self, message: impl Into<String>) -> ParseTypeError {
        let pos = self
            .toks
            .get(self.pos)
            .map(|(p, _)| *p)
            .unwrap_or(self.src.len());
        ParseTypeError {
            src: self.src.to_string(),
            pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Tok<'s>> {
        self.toks.get(self.pos).map(|(_, t)| t)
    }

    fn eat(&mut self, tok: &Tok<'_>) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok<'_>, what: &str) -> Result<(), ParseTypeError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn ident(&mut self) -> Result<&'s str, ParseTypeError> {
        match self.peek() {
            Some(Tok::Ident(name)) => {
                let name = *name;
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn finish(&self) -> Result<(), ParseTypeError> {
        if self.pos == self.toks.len() {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    fn parse_type(&mut self) -> Result<TypeExpr, ParseTypeError> {
        let base = self.parse_base()?;
        let mut ty = base;
        while self.eat(&Tok::LBracket) {
            self.expect(&Tok::RBracket, "`]`")?;
            if matches!(ty, TypeExpr::Wildcard(_)) {
                return Err(self.error("a wildcard cannot be an array component"));
            }
            if ty == TypeExpr::Prim(Prim::Void) {
                return Err(self.error("void cannot be an array component"));
            }
            ty = TypeExpr::array(ty);
        }
        Ok(ty)
    }

    fn parse_base(&mut self) -> Result<TypeExpr, ParseTypeError> {
        if self.eat(&Tok::Question) {
            return match self.peek() {
                Some(Tok::Ident("extends")) => {
                    self.pos += 1;
                    let upper = self.parse_type()?;
                    Ok(TypeExpr::Wildcard(Wildcard {
                        upper: Some(Box::new(upper)),
                        lower: None,
                    }))
                }
                Some(Tok::Ident("super")) => {
                    self.pos += 1;
                    let lower = self.parse_type()?;
                    Ok(TypeExpr::Wildcard(Wildcard {
                        upper: None,
                        lower: Some(Box::new(lower)),
                    }))
                }
                _ => Ok(TypeExpr::unbounded()),
            };
        }

        let name = self.ident()?;
        if let Some(p) = Prim::from_name(name) {
            return Ok(TypeExpr::Prim(p));
        }
        if self.vars.contains(&name) {
            if self.peek() == Some(&Tok::Lt) {
                return Err(self.error(format!("type variable `{name}` cannot take arguments")));
            }
            return Ok(TypeExpr::var(name));
        }
        if !self.eat(&Tok::Lt) {
            return Ok(TypeExpr::con(name));
        }
        let mut args = vec![self.parse_arg()?];
        while self.eat(&Tok::Comma) {
            args.push(self.parse_arg()?);
        }
        self.expect(&Tok::Gt, "`>` or `,`")?;
        Ok(TypeExpr::app(name, args))
    }

    fn parse_arg(&mut self) -> Result<TypeExpr, ParseTypeError> {
        let arg = self.parse_type()?;
        if arg.is_primitive() {
            return Err(self.error("a primitive cannot be a type argument"));
        }
        Ok(arg)
    }

    fn parse_param(&mut self) -> Result<TypeParam, ParseTypeError> {
        let name = self.ident()?;
        let mut bounds = Vec::new();
        if self.peek() == Some(&Tok::Ident("extends")) {
            self.pos += 1;
            bounds.push(self.parse_arg()?);
            while self.eat(&Tok::Amp) {
                bounds.push(self.parse_arg()?);
            }
        }
        Ok(TypeParam::bounded(name, bounds))
    }
}

/// Parse a type expression. `vars` lists the type variables in scope.
pub fn parse_type(src: &str, vars: &[&str]) -> Result<TypeExpr, ParseTypeError> {
    let mut p = Parser::new(src, vars)?;
    let ty = p.parse_type()?;
    p.finish()?;
    Ok(ty)
}

/// Parse a list of type parameter declarations, e.g.
/// `["K", "V extends Comparable<V>"]`. Every declared name is in scope in
/// every bound, so F-bounded declarations work.
pub fn parse_type_params(decls: &[String]) -> Result<Vec<TypeParam>, ParseTypeError> {
    parse_type_params_in(decls, &[])
}

/// Like [`parse_type_params`], with extra variables from an enclosing scope.
pub fn parse_type_params_in(
    decls: &[String],
    outer: &[&str],
) -> Result<Vec<TypeParam>, ParseTypeError> {
    let mut names: Vec<&str> = outer.to_vec();
    for decl in decls {
        let first = decl.split_whitespace().next().unwrap_or("");
        names.push(first);
    }
    decls
        .iter()
        .map(|decl| {
            let mut p = Parser::new(decl, &names)?;
            let param = p.parse_param()?;
            p.finish()?;
            Ok(param)
        })
        .collect()
}
