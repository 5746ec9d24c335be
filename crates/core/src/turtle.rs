//! A Turtle reader for the RDF replies of the extraction model.
//!
//! Covers prefix/base directives in both `@prefix` and `PREFIX` forms, IRIs,
//! prefixed names, `a`, string literals (short and long, with escapes,
//! language tags and datatypes), numbers, booleans, `;`/`,` lists, blank
//! node property lists and collections. Prefixes the reply forgot to declare
//! are kept verbatim as `prefix:local`.

use crate::error::ExtractionError;
use std::collections::BTreeMap;

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";
const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// Characters a local name may carry behind a backslash.
const LOCAL_ESCAPES: &str = "_~.-!$&'()*+,;=/?#@%";

const NAME_PREDICATES: [&str; 4] = ["name", "documentname", "document_name", "title"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    /// The part of an IRI after its last `#`, `/` or `:`.
    pub fn local_name(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => {
                let local = iri
                    .rsplit(|c: char| c == '#' || c == '/' || c == ':')
                    .next()
                    .unwrap_or(iri);
                Some(if local.is_empty() { iri } else { local })
            }
            _ => None,
        }
    }

    pub fn literal_value(&self) -> Option<&str> {
        match self {
            Term::Literal { value, .. } => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

/// Conceptual fields used to name a document's output folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFields {
    pub name: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurtleDocument {
    pub prefixes: BTreeMap<String, String>,
    pub triples: Vec<Triple>,
}

impl TurtleDocument {
    pub fn parse(input: &str) -> Result<Self, ExtractionError> {
        let tokens = Lexer::new(input).tokenize()?;
        Parser::new(tokens).parse()
    }

    /// The subject typed as a Document (or else the first named subject), its
    /// name/title literal or local name, and its date literal.
    pub fn document_fields(&self) -> DocumentFields {
        let subject = self
            .triples
            .iter()
            .find(|triple| {
                matches!(&triple.predicate, Term::Iri(iri) if iri == RDF_TYPE)
                    && triple
                        .object
                        .local_name()
                        .is_some_and(|name| name.eq_ignore_ascii_case("document"))
            })
            .or_else(|| {
                self.triples
                    .iter()
                    .find(|triple| matches!(triple.subject, Term::Iri(_)))
            })
            .or_else(|| self.triples.first())
            .map(|triple| &triple.subject);

        let Some(subject) = subject else {
            return DocumentFields::default();
        };

        let literal_for = |accept: &dyn Fn(&str) -> bool| {
            self.triples
                .iter()
                .filter(|triple| &triple.subject == subject)
                .filter(|triple| {
                    triple
                        .predicate
                        .local_name()
                        .is_some_and(|name| accept(&name.to_ascii_lowercase()))
                })
                .find_map(|triple| triple.object.literal_value())
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let name = literal_for(&|name| NAME_PREDICATES.contains(&name))
            .or_else(|| subject.local_name().map(str::to_string));
        let date = literal_for(&|name| name == "date");

        DocumentFields { name, date }
    }
}

fn turtle_error(line: usize, details: impl Into<String>) -> ExtractionError {
    ExtractionError::Turtle {
        line,
        details: details.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    IriRef(String),
    Prefixed(String, String),
    BlankLabel(String),
    Str(String),
    LangTag(String),
    Number(String),
    Word(String),
    PrefixDirective,
    BaseDirective,
    DoubleCaret,
    Dot,
    Semicolon,
    Comma,
    OpenBracket,
    CloseBracket,
    OpenParen,
    CloseParen,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let next = self.chars.next();
        if next == Some('\n') {
            self.line += 1;
        }
        next
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>, ExtractionError> {
        let mut tokens = Vec::new();

        while let Some(&c) = self.chars.peek() {
            let line = self.line;
            let token = match c {
                _ if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                '#' => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                    continue;
                }
                '<' => {
                    self.bump();
                    Token::IriRef(self.iri_ref()?)
                }
                '"' | '\'' => Token::Str(self.string(c)?),
                '@' => {
                    self.bump();
                    let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == '-');
                    match word.as_str() {
                        "prefix" => Token::PrefixDirective,
                        "base" => Token::BaseDirective,
                        "" => return Err(turtle_error(line, "dangling '@'")),
                        _ => Token::LangTag(word),
                    }
                }
                '^' => {
                    self.bump();
                    if self.bump() != Some('^') {
                        return Err(turtle_error(line, "expected '^^'"));
                    }
                    Token::DoubleCaret
                }
                '.' => {
                    self.bump();
                    Token::Dot
                }
                ';' => {
                    self.bump();
                    Token::Semicolon
                }
                ',' => {
                    self.bump();
                    Token::Comma
                }
                '[' => {
                    self.bump();
                    Token::OpenBracket
                }
                ']' => {
                    self.bump();
                    Token::CloseBracket
                }
                '(' => {
                    self.bump();
                    Token::OpenParen
                }
                ')' => {
                    self.bump();
                    Token::CloseParen
                }
                '_' => {
                    self.bump();
                    if self.bump() != Some(':') {
                        return Err(turtle_error(line, "expected ':' after '_'"));
                    }
                    Token::BlankLabel(self.name_chars())
                }
                _ if c.is_ascii_digit() || c == '+' || c == '-' => Token::Number(self.number()),
                _ if c.is_alphanumeric() || c == ':' => {
                    let word = self.name_chars();
                    match word.split_once(':') {
                        Some((prefix, local)) => Token::Prefixed(prefix.to_string(), local.to_string()),
                        None => Token::Word(word),
                    }
                }
                other => return Err(turtle_error(line, format!("unexpected character '{other}'"))),
            };
            tokens.push((token, line));
        }

        Ok(tokens)
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if !keep(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    /// Name characters; a '.' only belongs to the name when more name characters
    /// follow. `\-`-style escapes are kept as the escaped character.
    fn name_chars(&mut self) -> String {
        let mut out = String::new();
        loop {
            match self.chars.peek() {
                Some(&c) if c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '%') => {
                    out.push(c);
                    self.bump();
                }
                Some('\\') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.peek() {
                        Some(&c) if LOCAL_ESCAPES.contains(c) => {
                            self.bump();
                            self.bump();
                            out.push(c);
                        }
                        _ => break,
                    }
                }
                Some('.') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.peek() {
                        Some(&c) if c.is_alphanumeric() || matches!(c, '_' | '-' | ':') => {
                            out.push('.');
                            self.bump();
                        }
                        _ => break,
                    }
                }
                _ => break,
            }
        }
        out
    }

    fn number(&mut self) -> String {
        let mut out = String::new();
        if let Some(&sign) = self.chars.peek() {
            if sign == '+' || sign == '-' {
                out.push(sign);
                self.bump();
            }
        }
        out.push_str(&self.take_while(|c| c.is_ascii_digit()));

        if self.chars.peek() == Some(&'.') {
            let mut ahead = self.chars.clone();
            ahead.next();
            if ahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                out.push('.');
                self.bump();
                out.push_str(&self.take_while(|c| c.is_ascii_digit()));
            }
        }

        if matches!(self.chars.peek(), Some('e') | Some('E')) {
            out.push('e');
            self.bump();
            out.push_str(&self.take_while(|c| c.is_ascii_digit() || c == '+' || c == '-'));
        }
        out
    }

    fn iri_ref(&mut self) -> Result<String, ExtractionError> {
        let line = self.line;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('>') => return Ok(out),
                Some('\n') | None => return Err(turtle_error(line, "unterminated IRI")),
                Some(c) => out.push(c),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, ExtractionError> {
        let line = self.line;
        self.bump();

        let long = {
            let mut ahead = self.chars.clone();
            ahead.next() == Some(quote) && ahead.next() == Some(quote)
        };
        if long {
            self.bump();
            self.bump();
        } else if self.chars.peek() == Some(&quote) {
            self.bump();
            return Ok(String::new());
        }

        let mut out = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| turtle_error(line, "unterminated string literal"))?;
            match c {
                '\\' => out.push(self.escape(line)?),
                '\n' if !long => return Err(turtle_error(line, "newline in short string")),
                _ if c == quote && !long => return Ok(out),
                _ if c == quote => {
                    let mut ahead = self.chars.clone();
                    if ahead.next() == Some(quote) && ahead.next() == Some(quote) {
                        self.bump();
                        self.bump();
                        return Ok(out);
                    }
                    out.push(c);
                }
                _ => out.push(c),
            }
        }
    }

    fn escape(&mut self, line: usize) -> Result<char, ExtractionError> {
        let c = self
            .bump()
            .ok_or_else(|| turtle_error(line, "unterminated escape"))?;
        Ok(match c {
            't' => '\t',
            'n' => '\n',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            '"' | '\'' | '\\' => c,
            'u' | 'U' => {
                let width = if c == 'u' { 4 } else { 8 };
                let hex: String = (0..width).filter_map(|_| self.bump()).collect();
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| turtle_error(line, format!("bad unicode escape '{hex}'")))?
            }
            other => return Err(turtle_error(line, format!("unknown escape '\\{other}'"))),
        })
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    position: usize,
    prefixes: BTreeMap<String, String>,
    base: Option<String>,
    triples: Vec<Triple>,
    blank_counter: usize,
}

impl Parser {
    fn new(tokens: Vec<(Token, usize)>) -> Self {
        Self {
            tokens,
            position: 0,
            prefixes: BTreeMap::new(),
            base: None,
            triples: Vec::new(),
            blank_counter: 0,
        }
    }

    fn parse(mut self) -> Result<TurtleDocument, ExtractionError> {
        while self.peek().is_some() {
            self.statement()?;
        }

        Ok(TurtleDocument {
            prefixes: self.prefixes,
            triples: self.triples,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(token, _)| token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(|(_, line)| *line)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Result<Token, ExtractionError> {
        let line = self.line();
        let token = self
            .tokens
            .get(self.position)
            .map(|(token, _)| token.clone())
            .ok_or_else(|| turtle_error(line, "unexpected end of input"))?;
        self.position += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ExtractionError> {
        let line = self.line();
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(turtle_error(line, format!("expected {what}, found {token:?}")))
        }
    }

    fn statement(&mut self) -> Result<(), ExtractionError> {
        match self.peek() {
            Some(Token::PrefixDirective) => {
                self.next()?;
                self.prefix_body()?;
                self.expect(Token::Dot, "'.' after @prefix")
            }
            Some(Token::BaseDirective) => {
                self.next()?;
                self.base_body()?;
                self.expect(Token::Dot, "'.' after @base")
            }
            Some(Token::Word(word)) if word.eq_ignore_ascii_case("prefix") => {
                self.next()?;
                self.prefix_body()
            }
            Some(Token::Word(word)) if word.eq_ignore_ascii_case("base") => {
                self.next()?;
                self.base_body()
            }
            _ => {
                self.triples_statement()?;
                self.expect(Token::Dot, "'.' at end of statement")
            }
        }
    }

    fn prefix_body(&mut self) -> Result<(), ExtractionError> {
        let line = self.line();
        let prefix = match self.next()? {
            Token::Prefixed(prefix, local) if local.is_empty() => prefix,
            other => return Err(turtle_error(line, format!("expected prefix name, found {other:?}"))),
        };
        let iri = match self.next()? {
            Token::IriRef(iri) => self.resolve(iri),
            other => return Err(turtle_error(line, format!("expected IRI, found {other:?}"))),
        };
        self.prefixes.insert(prefix, iri);
        Ok(())
    }

    fn base_body(&mut self) -> Result<(), ExtractionError> {
        let line = self.line();
        match self.next()? {
            Token::IriRef(iri) => {
                self.base = Some(iri);
                Ok(())
            }
            other => Err(turtle_error(line, format!("expected base IRI, found {other:?}"))),
        }
    }

    fn triples_statement(&mut self) -> Result<(), ExtractionError> {
        if self.peek() == Some(&Token::OpenBracket) {
            let subject = self.blank_property_list()?;
            if self.peek() != Some(&Token::Dot) {
                self.predicate_object_list(&subject)?;
            }
            return Ok(());
        }

        let subject = self.subject()?;
        self.predicate_object_list(&subject)
    }

    fn subject(&mut self) -> Result<Term, ExtractionError> {
        let line = self.line();
        match self.next()? {
            Token::IriRef(iri) => Ok(Term::Iri(self.resolve(iri))),
            Token::Prefixed(prefix, local) => Ok(Term::Iri(self.expand(&prefix, &local))),
            Token::BlankLabel(label) => Ok(Term::Blank(label)),
            Token::OpenParen => self.collection(),
            other => Err(turtle_error(line, format!("expected subject, found {other:?}"))),
        }
    }

    fn predicate_object_list(&mut self, subject: &Term) -> Result<(), ExtractionError> {
        loop {
            let predicate = self.verb()?;
            self.object_list(subject, &predicate)?;

            if self.peek() != Some(&Token::Semicolon) {
                return Ok(());
            }
            while self.peek() == Some(&Token::Semicolon) {
                self.next()?;
            }
            if matches!(self.peek(), Some(Token::Dot) | Some(Token::CloseBracket) | None) {
                return Ok(());
            }
        }
    }

    fn verb(&mut self) -> Result<Term, ExtractionError> {
        let line = self.line();
        match self.next()? {
            Token::Word(word) if word == "a" => Ok(Term::Iri(RDF_TYPE.to_string())),
            Token::IriRef(iri) => Ok(Term::Iri(self.resolve(iri))),
            Token::Prefixed(prefix, local) => Ok(Term::Iri(self.expand(&prefix, &local))),
            other => Err(turtle_error(line, format!("expected predicate, found {other:?}"))),
        }
    }

    fn object_list(&mut self, subject: &Term, predicate: &Term) -> Result<(), ExtractionError> {
        loop {
            let object = self.object()?;
            self.triples.push(Triple {
                subject: subject.clone(),
                predicate: predicate.clone(),
                object,
            });

            if self.peek() != Some(&Token::Comma) {
                return Ok(());
            }
            self.next()?;
        }
    }

    fn object(&mut self) -> Result<Term, ExtractionError> {
        let line = self.line();
        if self.peek() == Some(&Token::OpenBracket) {
            return self.blank_property_list();
        }

        match self.next()? {
            Token::IriRef(iri) => Ok(Term::Iri(self.resolve(iri))),
            Token::Prefixed(prefix, local) => Ok(Term::Iri(self.expand(&prefix, &local))),
            Token::BlankLabel(label) => Ok(Term::Blank(label)),
            Token::Str(value) => self.literal_suffix(value),
            Token::Number(number) => {
                let datatype = if number.contains('e') {
                    "double"
                } else if number.contains('.') {
                    "decimal"
                } else {
                    "integer"
                };
                Ok(Term::Literal {
                    value: number,
                    datatype: Some(format!("{XSD}{datatype}")),
                    language: None,
                })
            }
            Token::Word(word) if word == "true" || word == "false" => Ok(Term::Literal {
                value: word,
                datatype: Some(format!("{XSD}boolean")),
                language: None,
            }),
            Token::OpenParen => self.collection(),
            other => Err(turtle_error(line, format!("expected object, found {other:?}"))),
        }
    }

    fn literal_suffix(&mut self, value: String) -> Result<Term, ExtractionError> {
        match self.peek() {
            Some(Token::LangTag(_)) => {
                let language = match self.next()? {
                    Token::LangTag(tag) => Some(tag),
                    _ => None,
                };
                Ok(Term::Literal {
                    value,
                    datatype: None,
                    language,
                })
            }
            Some(Token::DoubleCaret) => {
                self.next()?;
                let datatype = self.verb()?;
                let datatype = match datatype {
                    Term::Iri(iri) => Some(iri),
                    _ => None,
                };
                Ok(Term::Literal {
                    value,
                    datatype,
                    language: None,
                })
            }
            _ => Ok(Term::Literal {
                value,
                datatype: None,
                language: None,
            }),
        }
    }

    fn blank_property_list(&mut self) -> Result<Term, ExtractionError> {
        self.expect(Token::OpenBracket, "'['")?;
        self.blank_counter += 1;
        let node = Term::Blank(format!("anon{}", self.blank_counter));

        if self.peek() != Some(&Token::CloseBracket) {
            self.predicate_object_list(&node)?;
        }
        self.expect(Token::CloseBracket, "']'")?;
        Ok(node)
    }

    /// Members after an opening `(`, chained through `rdf:first`/`rdf:rest`.
    /// The empty collection is `rdf:nil`.
    fn collection(&mut self) -> Result<Term, ExtractionError> {
        let mut members = Vec::new();
        while self.peek() != Some(&Token::CloseParen) {
            if self.peek().is_none() {
                return Err(turtle_error(self.line(), "unterminated collection"));
            }
            members.push(self.object()?);
        }
        self.next()?;

        let mut rest = Term::Iri(RDF_NIL.to_string());
        let mut nodes = Vec::with_capacity(members.len());
        for _ in &members {
            self.blank_counter += 1;
            nodes.push(Term::Blank(format!("anon{}", self.blank_counter)));
        }
        for (node, member) in nodes.iter().zip(members).rev() {
            self.triples.push(Triple {
                subject: node.clone(),
                predicate: Term::Iri(RDF_FIRST.to_string()),
                object: member,
            });
            self.triples.push(Triple {
                subject: node.clone(),
                predicate: Term::Iri(RDF_REST.to_string()),
                object: rest,
            });
            rest = node.clone();
        }
        Ok(rest)
    }

    fn expand(&self, prefix: &str, local: &str) -> String {
        match self.prefixes.get(prefix) {
            Some(namespace) => format!("{namespace}{local}"),
            None => format!("{prefix}:{local}"),
        }
    }

    fn resolve(&self, iri: String) -> String {
        match &self.base {
            Some(base) if !iri.contains(':') => format!("{base}{iri}"),
            _ => iri,
        }
    }
}
