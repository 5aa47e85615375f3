//! Recursive descent parser for GraphQL documents.
//!
//! The parser stops at the first syntax error. Error messages follow the
//! wording GraphQL clients already know, e.g.
//! `Syntax Error: Unexpected Name "invalid".`.

use crate::ast::*;
use crate::lexer::{block_string_value, string_value, Lexer};
use crate::token::{Token, TokenKind};
use batchql_core::{diagnostics::codes, Diagnostic, Span};

/// Result of parsing.
pub type ParseResult<T> = Result<T, Diagnostic>;

/// Parses a source string into a document.
pub fn parse(source: &str) -> ParseResult<Document> {
    Parser::new(source)?.parse_document()
}

/// Parser for GraphQL documents.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    prev_end: u32,
}

impl<'a> Parser<'a> {
    /// Creates a new parser positioned at the first token.
    pub fn new(source: &'a str) -> ParseResult<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            prev_end: 0,
        })
    }

    /// Returns the current token kind.
    #[inline]
    fn at(&self) -> TokenKind {
        self.current.kind
    }

    /// Returns true if at the given kind.
    #[inline]
    fn at_kind(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Returns true if at a name with the given text.
    fn at_keyword(&self, keyword: &str) -> bool {
        self.at_kind(TokenKind::Name) && self.current_text() == keyword
    }

    /// Gets the text of the current token.
    fn current_text(&self) -> &'a str {
        self.lexer.span_text(self.current.span)
    }

    /// Advances to the next token.
    fn advance(&mut self) -> ParseResult<()> {
        self.prev_end = self.current.span.end;
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    /// Consumes the current token if it has the given kind.
    fn eat(&mut self, kind: TokenKind) -> ParseResult<bool> {
        if self.at_kind(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consumes the current token if it is the given keyword.
    fn eat_keyword(&mut self, keyword: &str) -> ParseResult<bool> {
        if self.at_keyword(keyword) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Expects a specific token kind.
    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.at_kind(kind) {
            let token = self.current;
            self.advance()?;
            Ok(token)
        } else {
            Err(self.error(format_args!(
                "Expected {kind}, found {}.",
                self.describe_current()
            )))
        }
    }

    /// Expects a specific keyword.
    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_keyword(keyword)? {
            Ok(())
        } else {
            Err(self.error(format_args!(
                "Expected \"{keyword}\", found {}.",
                self.describe_current()
            )))
        }
    }

    fn describe_current(&self) -> String {
        self.current.describe(self.lexer.source())
    }

    /// Reports an error at the current token.
    fn error(&self, message: impl std::fmt::Display) -> Diagnostic {
        Diagnostic::error(codes::SYNTAX, format!("Syntax Error: {message}"))
            .with_span(self.current.span)
    }

    /// Reports the current token as unexpected.
    fn unexpected(&self) -> Diagnostic {
        self.error(format_args!("Unexpected {}.", self.describe_current()))
    }

    /// Span from `start` to the end of the last consumed token.
    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.prev_end.max(start))
    }

    /// Parses a name.
    fn parse_name(&mut self) -> ParseResult<Name> {
        let token = self.expect(TokenKind::Name)?;
        Ok(Name {
            value: self.lexer.span_text(token.span).to_string(),
            span: token.span,
        })
    }

    /// Parses a document.
    pub fn parse_document(&mut self) -> ParseResult<Document> {
        let start = self.current.span.start;
        let mut definitions = Vec::new();

        // An empty document is a syntax error, just like an empty selection set.
        loop {
            definitions.push(self.parse_definition()?);
            if self.at_kind(TokenKind::Eof) {
                break;
            }
        }

        Ok(Document {
            definitions,
            span: self.span_from(start),
        })
    }

    /// Parses a definition.
    fn parse_definition(&mut self) -> ParseResult<Definition> {
        if self.at_kind(TokenKind::LBrace) {
            return self.parse_operation_definition().map(Definition::Operation);
        }

        let start = self.current.span.start;
        let description = self.parse_description()?;

        if !self.at_kind(TokenKind::Name) {
            return Err(self.unexpected());
        }

        match self.current_text() {
            "query" | "mutation" | "subscription" if description.is_none() => {
                self.parse_operation_definition().map(Definition::Operation)
            }
            "fragment" if description.is_none() => {
                self.parse_fragment_definition().map(Definition::Fragment)
            }
            "schema" => self.parse_schema_definition(start).map(Definition::Schema),
            "directive" => self
                .parse_directive_definition(start, description)
                .map(Definition::Directive),
            "extend" if description.is_none() => self.parse_extension(),
            "scalar" | "type" | "interface" | "union" | "enum" | "input" => self
                .parse_type_definition(start, description)
                .map(Definition::Type),
            _ => Err(self.unexpected()),
        }
    }

    // =========================================================================
    // Executable definitions
    // =========================================================================

    fn parse_operation_definition(&mut self) -> ParseResult<OperationDefinition> {
        let start = self.current.span.start;

        if self.at_kind(TokenKind::LBrace) {
            let selection_set = self.parse_selection_set()?;
            return Ok(OperationDefinition {
                operation: OperationType::Query,
                name: None,
                variables: Vec::new(),
                directives: Vec::new(),
                selection_set,
                span: self.span_from(start),
            });
        }

        let operation = self.parse_operation_type()?;
        let name = if self.at_kind(TokenKind::Name) {
            Some(self.parse_name()?)
        } else {
            None
        };
        let variables = self.parse_variable_definitions()?;
        let directives = self.parse_directives(false)?;
        let selection_set = self.parse_selection_set()?;

        Ok(OperationDefinition {
            operation,
            name,
            variables,
            directives,
            selection_set,
            span: self.span_from(start),
        })
    }

    fn parse_operation_type(&mut self) -> ParseResult<OperationType> {
        let Some(operation) = self
            .at_kind(TokenKind::Name)
            .then(|| OperationType::from_keyword(self.current_text()))
            .flatten()
        else {
            return Err(self.unexpected());
        };
        self.advance()?;
        Ok(operation)
    }

    fn parse_variable_definitions(&mut self) -> ParseResult<Vec<VariableDefinition>> {
        let mut variables = Vec::new();
        if !self.eat(TokenKind::LParen)? {
            return Ok(variables);
        }

        loop {
            let start = self.current.span.start;
            self.expect(TokenKind::Dollar)?;
            let name = self.parse_name()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            let default_value = if self.eat(TokenKind::Eq)? {
                Some(self.parse_value(true)?)
            } else {
                None
            };
            let directives = self.parse_directives(true)?;
            variables.push(VariableDefinition {
                name,
                ty,
                default_value,
                directives,
                span: self.span_from(start),
            });

            if self.eat(TokenKind::RParen)? {
                return Ok(variables);
            }
        }
    }

    fn parse_selection_set(&mut self) -> ParseResult<SelectionSet> {
        let start = self.current.span.start;
        self.expect(TokenKind::LBrace)?;

        let mut selections = Vec::new();
        loop {
            selections.push(self.parse_selection()?);
            if self.eat(TokenKind::RBrace)? {
                break;
            }
        }

        Ok(SelectionSet {
            selections,
            span: self.span_from(start),
        })
    }

    fn parse_selection(&mut self) -> ParseResult<Selection> {
        let start = self.current.span.start;

        if !self.eat(TokenKind::Spread)? {
            return self.parse_field().map(Selection::Field);
        }

        if self.at_kind(TokenKind::Name) && !self.at_keyword("on") {
            let name = self.parse_name()?;
            let directives = self.parse_directives(false)?;
            return Ok(Selection::FragmentSpread(FragmentSpread {
                name,
                directives,
                span: self.span_from(start),
            }));
        }

        let type_condition = if self.eat_keyword("on")? {
            Some(self.parse_name()?)
        } else {
            None
        };
        let directives = self.parse_directives(false)?;
        let selection_set = self.parse_selection_set()?;

        Ok(Selection::InlineFragment(InlineFragment {
            type_condition,
            directives,
            selection_set,
            span: self.span_from(start),
        }))
    }

    fn parse_field(&mut self) -> ParseResult<Field> {
        let start = self.current.span.start;
        let first = self.parse_name()?;

        let (alias, name) = if self.eat(TokenKind::Colon)? {
            (Some(first), self.parse_name()?)
        } else {
            (None, first)
        };

        let arguments = self.parse_arguments(false)?;
        let directives = self.parse_directives(false)?;
        let selection_set = if self.at_kind(TokenKind::LBrace) {
            Some(self.parse_selection_set()?)
        } else {
            None
        };

        Ok(Field {
            alias,
            name,
            arguments,
            directives,
            selection_set,
            span: self.span_from(start),
        })
    }

    fn parse_arguments(&mut self, is_const: bool) -> ParseResult<Vec<Argument>> {
        let mut arguments = Vec::new();
        if !self.eat(TokenKind::LParen)? {
            return Ok(arguments);
        }

        loop {
            let start = self.current.span.start;
            let name = self.parse_name()?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_value(is_const)?;
            arguments.push(Argument {
                name,
                value,
                span: self.span_from(start),
            });

            if self.eat(TokenKind::RParen)? {
                return Ok(arguments);
            }
        }
    }

    fn parse_directives(&mut self, is_const: bool) -> ParseResult<Vec<Directive>> {
        let mut directives = Vec::new();
        while self.at_kind(TokenKind::At) {
            let start = self.current.span.start;
            self.advance()?;
            let name = self.parse_name()?;
            let arguments = self.parse_arguments(is_const)?;
            directives.push(Directive {
                name,
                arguments,
                span: self.span_from(start),
            });
        }
        Ok(directives)
    }

    fn parse_fragment_definition(&mut self) -> ParseResult<FragmentDefinition> {
        let start = self.current.span.start;
        self.expect_keyword("fragment")?;

        if self.at_keyword("on") {
            return Err(self.unexpected());
        }
        let name = self.parse_name()?;
        self.expect_keyword("on")?;
        let type_condition = self.parse_name()?;
        let directives = self.parse_directives(false)?;
        let selection_set = self.parse_selection_set()?;

        Ok(FragmentDefinition {
            name,
            type_condition,
            directives,
            selection_set,
            span: self.span_from(start),
        })
    }

    // =========================================================================
    // Types and values
    // =========================================================================

    fn parse_type(&mut self) -> ParseResult<Type> {
        let ty = if self.eat(TokenKind::LBracket)? {
            let inner = self.parse_type()?;
            self.expect(TokenKind::RBracket)?;
            Type::List(Box::new(inner))
        } else {
            Type::Named(self.parse_name()?)
        };

        if self.eat(TokenKind::Bang)? {
            Ok(Type::NonNull(Box::new(ty)))
        } else {
            Ok(ty)
        }
    }

    fn parse_value(&mut self, is_const: bool) -> ParseResult<Value> {
        let text = self.current_text();

        let value = match self.at() {
            TokenKind::Dollar if !is_const => {
                self.advance()?;
                return self.parse_name().map(Value::Variable);
            }
            TokenKind::LBracket => {
                self.advance()?;
                let mut values = Vec::new();
                while !self.eat(TokenKind::RBracket)? {
                    values.push(self.parse_value(is_const)?);
                }
                return Ok(Value::List(values));
            }
            TokenKind::LBrace => {
                self.advance()?;
                let mut fields = Vec::new();
                while !self.eat(TokenKind::RBrace)? {
                    let name = self.parse_name()?;
                    self.expect(TokenKind::Colon)?;
                    fields.push((name, self.parse_value(is_const)?));
                }
                return Ok(Value::Object(fields));
            }
            TokenKind::Int => match text.parse::<i64>() {
                Ok(int) => Value::Int(int),
                Err(_) => {
                    return Err(self.error(format_args!("Int cannot represent value: {text}.")))
                }
            },
            TokenKind::Float => match text.parse::<f64>() {
                Ok(float) => Value::Float(float),
                Err(_) => return Err(self.unexpected()),
            },
            TokenKind::String => Value::String(string_value(text)),
            TokenKind::BlockString => Value::String(block_string_value(text)),
            TokenKind::Name => match text {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                "null" => Value::Null,
                _ => Value::Enum(text.to_string()),
            },
            _ => return Err(self.unexpected()),
        };

        self.advance()?;
        Ok(value)
    }

    // =========================================================================
    // Type system definitions
    // =========================================================================

    fn parse_description(&mut self) -> ParseResult<Option<String>> {
        let text = self.current_text();
        let description = match self.at() {
            TokenKind::String => string_value(text),
            TokenKind::BlockString => block_string_value(text),
            _ => return Ok(None),
        };
        self.advance()?;
        Ok(Some(description))
    }

    fn parse_schema_definition(&mut self, start: u32) -> ParseResult<SchemaDefinition> {
        self.expect_keyword("schema")?;
        let directives = self.parse_directives(true)?;

        let mut operations = Vec::new();
        if self.eat(TokenKind::LBrace)? {
            loop {
                let operation = self.parse_operation_type()?;
                self.expect(TokenKind::Colon)?;
                operations.push((operation, self.parse_name()?));
                if self.eat(TokenKind::RBrace)? {
                    break;
                }
            }
        }

        Ok(SchemaDefinition {
            directives,
            operations,
            span: self.span_from(start),
        })
    }

    fn parse_extension(&mut self) -> ParseResult<Definition> {
        let start = self.current.span.start;
        self.expect_keyword("extend")?;

        if self.at_keyword("schema") {
            return self.parse_schema_definition(start).map(Definition::Schema);
        }
        self.parse_type_definition(start, None)
            .map(Definition::TypeExtension)
    }

    fn parse_type_definition(
        &mut self,
        start: u32,
        description: Option<String>,
    ) -> ParseResult<TypeDefinition> {
        if !self.at_kind(TokenKind::Name) {
            return Err(self.unexpected());
        }
        let keyword = self.current_text();

        match keyword {
            "scalar" => {
                self.advance()?;
                let name = self.parse_name()?;
                let directives = self.parse_directives(true)?;
                Ok(TypeDefinition::Scalar(ScalarTypeDefinition {
                    description,
                    name,
                    directives,
                    span: self.span_from(start),
                }))
            }
            "type" | "interface" => {
                self.advance()?;
                let name = self.parse_name()?;
                let implements = self.parse_implements()?;
                let directives = self.parse_directives(true)?;
                let fields = self.parse_fields_definition()?;
                let def = ObjectTypeDefinition {
                    description,
                    name,
                    implements,
                    directives,
                    fields,
                    span: self.span_from(start),
                };
                Ok(if keyword == "type" {
                    TypeDefinition::Object(def)
                } else {
                    TypeDefinition::Interface(def)
                })
            }
            "union" => {
                self.advance()?;
                let name = self.parse_name()?;
                let directives = self.parse_directives(true)?;
                let mut members = Vec::new();
                if self.eat(TokenKind::Eq)? {
                    self.eat(TokenKind::Pipe)?;
                    loop {
                        members.push(self.parse_name()?);
                        if !self.eat(TokenKind::Pipe)? {
                            break;
                        }
                    }
                }
                Ok(TypeDefinition::Union(UnionTypeDefinition {
                    description,
                    name,
                    directives,
                    members,
                    span: self.span_from(start),
                }))
            }
            "enum" => {
                self.advance()?;
                let name = self.parse_name()?;
                let directives = self.parse_directives(true)?;
                let mut values = Vec::new();
                if self.eat(TokenKind::LBrace)? {
                    loop {
                        let description = self.parse_description()?;
                        let name = self.parse_name()?;
                        let directives = self.parse_directives(true)?;
                        values.push(EnumValueDefinition {
                            description,
                            name,
                            directives,
                        });
                        if self.eat(TokenKind::RBrace)? {
                            break;
                        }
                    }
                }
                Ok(TypeDefinition::Enum(EnumTypeDefinition {
                    description,
                    name,
                    directives,
                    values,
                    span: self.span_from(start),
                }))
            }
            "input" => {
                self.advance()?;
                let name = self.parse_name()?;
                let directives = self.parse_directives(true)?;
                let mut fields = Vec::new();
                if self.eat(TokenKind::LBrace)? {
                    loop {
                        fields.push(self.parse_input_value_definition()?);
                        if self.eat(TokenKind::RBrace)? {
                            break;
                        }
                    }
                }
                Ok(TypeDefinition::Input(InputObjectTypeDefinition {
                    description,
                    name,
                    directives,
                    fields,
                    span: self.span_from(start),
                }))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_implements(&mut self) -> ParseResult<Vec<Name>> {
        let mut interfaces = Vec::new();
        if !self.eat_keyword("implements")? {
            return Ok(interfaces);
        }
        self.eat(TokenKind::Amp)?;
        loop {
            interfaces.push(self.parse_name()?);
            if !self.eat(TokenKind::Amp)? {
                return Ok(interfaces);
            }
        }
    }

    fn parse_fields_definition(&mut self) -> ParseResult<Vec<FieldDefinition>> {
        let mut fields = Vec::new();
        if !self.eat(TokenKind::LBrace)? {
            return Ok(fields);
        }

        loop {
            let start = self.current.span.start;
            let description = self.parse_description()?;
            let name = self.parse_name()?;
            let arguments = self.parse_arguments_definition()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            let directives = self.parse_directives(true)?;
            fields.push(FieldDefinition {
                description,
                name,
                arguments,
                ty,
                directives,
                span: self.span_from(start),
            });

            if self.eat(TokenKind::RBrace)? {
                return Ok(fields);
            }
        }
    }

    fn parse_arguments_definition(&mut self) -> ParseResult<Vec<InputValueDefinition>> {
        let mut arguments = Vec::new();
        if !self.eat(TokenKind::LParen)? {
            return Ok(arguments);
        }

        loop {
            arguments.push(self.parse_input_value_definition()?);
            if self.eat(TokenKind::RParen)? {
                return Ok(arguments);
            }
        }
    }

    fn parse_input_value_definition(&mut self) -> ParseResult<InputValueDefinition> {
        let start = self.current.span.start;
        let description = self.parse_description()?;
        let name = self.parse_name()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        let default_value = if self.eat(TokenKind::Eq)? {
            Some(self.parse_value(true)?)
        } else {
            None
        };
        let directives = self.parse_directives(true)?;

        Ok(InputValueDefinition {
            description,
            name,
            ty,
            default_value,
            directives,
            span: self.span_from(start),
        })
    }

    fn parse_directive_definition(
        &mut self,
        start: u32,
        description: Option<String>,
    ) -> ParseResult<DirectiveDefinition> {
        self.expect_keyword("directive")?;
        self.expect(TokenKind::At)?;
        let name = self.parse_name()?;
        let arguments = self.parse_arguments_definition()?;
        let repeatable = self.eat_keyword("repeatable")?;
        self.expect_keyword("on")?;

        self.eat(TokenKind::Pipe)?;
        let mut locations = Vec::new();
        loop {
            locations.push(self.parse_name()?);
            if !self.eat(TokenKind::Pipe)? {
                break;
            }
        }

        Ok(DirectiveDefinition {
            description,
            name,
            arguments,
            repeatable,
            locations,
            span: self.span_from(start),
        })
    }
}
