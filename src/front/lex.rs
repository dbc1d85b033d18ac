//! The lexer.

use derive_more::Display;
use regex::Regex;

/// Tokens in the program
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[display("kind: '{kind}', part of input: '{text}'")]
pub struct Token<'src> {
    /// What token class this token belongs to.
    pub kind: TokenKind,
    /// What part of the input this token carries.
    pub text: &'src str,
    /// The line the token starts on.
    pub line: usize,
}

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Display, Debug)]
pub enum TokenKind {
    #[display("id")]
    Ident,
    #[display("intConst")]
    IntLit,
    #[display("doubleConst")]
    DoubleLit,
    #[display("stringConst")]
    StringLit,
    #[display("void")]
    Void,
    #[display("int")]
    Int,
    #[display("double")]
    Double,
    #[display("bool")]
    Bool,
    #[display("string")]
    String,
    #[display("class")]
    Class,
    #[display("interface")]
    Interface,
    #[display("null")]
    Null,
    #[display("this")]
    This,
    #[display("extends")]
    Extends,
    #[display("implements")]
    Implements,
    #[display("for")]
    For,
    #[display("while")]
    While,
    #[display("if")]
    If,
    #[display("else")]
    Else,
    #[display("return")]
    Return,
    #[display("break")]
    Break,
    #[display("New")]
    New,
    #[display("NewArray")]
    NewArray,
    #[display("Print")]
    Print,
    #[display("ReadInteger")]
    ReadInteger,
    #[display("ReadLine")]
    ReadLine,
    #[display("true")]
    True,
    #[display("false")]
    False,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("%")]
    Percent,
    #[display("<=")]
    LessEq,
    #[display("<")]
    Less,
    #[display(">=")]
    GreaterEq,
    #[display(">")]
    Greater,
    #[display("==")]
    EqEq,
    #[display("!=")]
    NotEq,
    #[display("=")]
    Assign,
    #[display("&&")]
    And,
    #[display("||")]
    Or,
    #[display("!")]
    Not,
    #[display(";")]
    Semi,
    #[display(",")]
    Comma,
    #[display(".")]
    Dot,
    #[display("[")]
    LBracket,
    #[display("]")]
    RBracket,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
}

pub struct LexError(usize, char);

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lexer error: unexpected character {:?} at line {}",
            self.1, self.0
        )
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    line: usize,
    whitespace: Regex,
    matchers: Vec<(Regex, TokenKind)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        use TokenKind::*;

        let m = |pat: &str, kind: TokenKind| {
            let re = Regex::new(pat).expect("token pattern should be a valid regex");
            (re, kind)
        };
        Lexer {
            input,
            pos: 0,
            line: 1,
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n\x0B]|//[^\n]*|/\*(?s:.)*?\*/)*")
                .expect("whitespace pattern should be a valid regex"),
            matchers: vec![
                // Keywords first; \b keeps them from eating identifier prefixes.
                m(r"\Avoid\b", Void),
                m(r"\Aint\b", Int),
                m(r"\Adouble\b", Double),
                m(r"\Abool\b", Bool),
                m(r"\Astring\b", String),
                m(r"\Aclass\b", Class),
                m(r"\Ainterface\b", Interface),
                m(r"\Anull\b", Null),
                m(r"\Athis\b", This),
                m(r"\Aextends\b", Extends),
                m(r"\Aimplements\b", Implements),
                m(r"\Afor\b", For),
                m(r"\Awhile\b", While),
                m(r"\Aif\b", If),
                m(r"\Aelse\b", Else),
                m(r"\Areturn\b", Return),
                m(r"\Abreak\b", Break),
                m(r"\ANewArray\b", NewArray),
                m(r"\ANew\b", New),
                m(r"\APrint\b", Print),
                m(r"\AReadInteger\b", ReadInteger),
                m(r"\AReadLine\b", ReadLine),
                m(r"\Atrue\b", True),
                m(r"\Afalse\b", False),
                m(r"\A[a-zA-Z][a-zA-Z0-9_]*", Ident),
                // doubleConst before intConst so "12.5" is not lexed as "12".
                m(r"\A\d+\.\d*(?:[Ee][+-]?\d+)?", DoubleLit),
                m(r"\A(?:0[xX][0-9a-fA-F]+|\d+)", IntLit),
                m(r#"\A"[^"\n]*""#, StringLit),
                // Two-character operators before their one-character prefixes.
                m(r"\A<=", LessEq),
                m(r"\A>=", GreaterEq),
                m(r"\A==", EqEq),
                m(r"\A!=", NotEq),
                m(r"\A&&", And),
                m(r"\A\|\|", Or),
                m(r"\A\+", Plus),
                m(r"\A-", Minus),
                m(r"\A\*", Star),
                m(r"\A/", Slash),
                m(r"\A%", Percent),
                m(r"\A<", Less),
                m(r"\A>", Greater),
                m(r"\A=", Assign),
                m(r"\A!", Not),
                m(r"\A;", Semi),
                m(r"\A,", Comma),
                m(r"\A\.", Dot),
                m(r"\A\[", LBracket),
                m(r"\A\]", RBracket),
                m(r"\A\(", LParen),
                m(r"\A\)", RParen),
                m(r"\A\{", LBrace),
                m(r"\A\}", RBrace),
            ],
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    // Skip comments and whitespace
    fn skip_whitespace(&mut self) {
        let skipped = self
            .whitespace
            .find(&self.input[self.pos..])
            .map(|m| m.end());
        if let Some(len) = skipped {
            self.advance(len);
        }
    }

    // Consume `len` bytes, keeping the line counter in step.
    fn advance(&mut self, len: usize) {
        let consumed = &self.input[self.pos..self.pos + len];
        self.line += consumed.matches('\n').count();
        self.pos += len;
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }
        let input = self.input;
        let rest = &input[self.pos..];
        let mut matched: Option<(usize, TokenKind)> = None;
        for (re, kind) in &self.matchers {
            if let Some(m) = re.find(rest) {
                matched = Some((m.end(), *kind));
                break;
            }
        }
        match matched {
            Some((len, kind)) => {
                let token = Token {
                    kind,
                    text: &rest[..len],
                    line: self.line,
                };
                self.advance(len);
                Ok(Some(token))
            }
            None => {
                let stray = rest.chars().next().expect("input should not be exhausted");
                Err(LexError(self.line, stray))
            }
        }
    }

    /// Lex the whole input into a token list.
    pub fn tokens(mut self) -> Result<Vec<Token<'input>>, LexError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::TokenKind::*;
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokens()
            .expect("input should lex")
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_do_not_eat_identifiers() {
        assert_eq!(kinds("int intx"), vec![Int, Ident]);
        assert_eq!(kinds("New NewArray Newish"), vec![New, NewArray, Ident]);
    }

    #[test]
    fn numbers_and_strings() {
        let toks = Lexer::new(r#"12 0x1F 12.5 "hi there""#)
            .tokens()
            .expect("input should lex");
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![IntLit, IntLit, DoubleLit, StringLit]
        );
        assert_eq!(toks[1].text, "0x1F");
        assert_eq!(toks[3].text, "\"hi there\"");
    }

    #[test]
    fn comments_are_whitespace() {
        assert_eq!(
            kinds("a // line comment\n/* block\ncomment */ b"),
            vec![Ident, Ident]
        );
    }

    #[test]
    fn compound_operators_win_over_prefixes() {
        assert_eq!(
            kinds("<= < == = != ! >= >"),
            vec![LessEq, Less, EqEq, Assign, NotEq, Not, GreaterEq, Greater]
        );
    }

    #[test]
    fn lines_are_tracked() {
        let toks = Lexer::new("a\nb\n\nc").tokens().expect("input should lex");
        assert_eq!(
            toks.iter().map(|t| t.line).collect::<Vec<_>>(),
            vec![1, 2, 4]
        );
    }

    #[test]
    fn stray_character_is_an_error() {
        let mut lexer = Lexer::new("a # b");
        assert!(lexer.next().expect("first token should lex").is_some());
        let err = lexer.next().expect_err("stray character should error");
        assert_eq!(
            err.to_string(),
            "Lexer error: unexpected character '#' at line 1"
        );
    }
}
