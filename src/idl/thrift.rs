//! Thrift IDL parser.

use super::lexer::{tokenize, Cursor, Token};
use super::{
    insert_annotation, is_base_type, Annotations, Field, Function, ParsedIdl, Requiredness,
    Service, TypeDecl, TypeKind, TypeRef,
};
use crate::error::GenError;
use std::path::Path;

pub(crate) fn parse(path: &Path, src: &str) -> Result<ParsedIdl, GenError> {
    let tokens = tokenize(path, src)?;
    let mut parser = Parser {
        cur: Cursor::new(path, &tokens),
        path,
    };
    parser.document()
}

struct Parser<'a> {
    cur: Cursor<'a>,
    path: &'a Path,
}

impl<'a> Parser<'a> {
    fn document(&mut self) -> Result<ParsedIdl, GenError> {
        let mut doc = ParsedIdl::default();
        while !self.cur.at_end() {
            let keyword = self.cur.expect_ident()?;
            match keyword.as_str() {
                "include" | "cpp_include" => {
                    let target = self.cur.expect_str()?;
                    if keyword == "include" {
                        doc.includes.push(target);
                    }
                }
                "namespace" => {
                    let scope = if self.cur.eat_punct('*') {
                        "*".to_string()
                    } else {
                        self.cur.expect_ident()?
                    };
                    let name = self.cur.expect_ident()?;
                    if scope == "go" || (scope == "*" && doc.namespace.is_none()) {
                        doc.namespace = Some(name);
                    }
                }
                "const" => {
                    self.field_type()?;
                    self.cur.expect_ident()?;
                    self.cur.expect_punct('=')?;
                    self.cur.skip_value()?;
                }
                "typedef" => {
                    let target = self.field_type()?;
                    let mut annotations = self.annotations()?;
                    let name = self.cur.expect_ident()?;
                    let trailing = self.annotations()?;
                    self.merge(&mut annotations, trailing)?;
                    let mut decl = TypeDecl::new(name, TypeKind::Typedef);
                    decl.target = Some(target);
                    decl.annotations = annotations;
                    doc.types.push(decl);
                }
                "enum" | "senum" => doc.types.push(self.enumeration()?),
                "struct" => doc.types.push(self.structure(TypeKind::Struct)?),
                "union" => doc.types.push(self.structure(TypeKind::Union)?),
                "exception" => doc.types.push(self.structure(TypeKind::Exception)?),
                "service" => doc.services.push(self.service()?),
                other => return Err(self.cur.error(format!("unexpected `{other}` at top level"))),
            }
            self.cur.eat_separator();
        }
        Ok(doc)
    }

    fn merge(&self, into: &mut Annotations, from: Annotations) -> Result<(), GenError> {
        for (key, value) in from {
            insert_annotation(self.path, into, key, value)?;
        }
        Ok(())
    }

    /// `( key = "value", key2 = "value2" )`, absent when the next token is not `(`.
    fn annotations(&mut self) -> Result<Annotations, GenError> {
        let mut annotations = Annotations::new();
        if !self.cur.eat_punct('(') {
            return Ok(annotations);
        }
        while !self.cur.eat_punct(')') {
            let key = self.cur.expect_ident()?;
            let value = if self.cur.eat_punct('=') {
                self.cur.expect_str()?
            } else {
                String::new()
            };
            insert_annotation(self.path, &mut annotations, key, value)?;
            self.cur.eat_separator();
        }
        Ok(annotations)
    }

    fn field_type(&mut self) -> Result<TypeRef, GenError> {
        let name = self.cur.expect_ident()?;
        let ty = match name.as_str() {
            "list" | "set" => {
                self.cur.expect_punct('<')?;
                let inner = Box::new(self.field_type()?);
                self.cur.expect_punct('>')?;
                if name == "list" {
                    TypeRef::List(inner)
                } else {
                    TypeRef::Set(inner)
                }
            }
            "map" => {
                self.cur.expect_punct('<')?;
                let key = Box::new(self.field_type()?);
                self.cur.expect_punct(',')?;
                let value = Box::new(self.field_type()?);
                self.cur.expect_punct('>')?;
                TypeRef::Map(key, value)
            }
            base if is_base_type(base) => TypeRef::Base(name),
            _ => TypeRef::Named(name),
        };
        Ok(ty)
    }

    fn field(&mut self) -> Result<Field, GenError> {
        let id = if matches!(self.cur.peek(), Some(Token::Number(_)))
            && matches!(self.cur.peek_at(1), Some(Token::Punct(':')))
        {
            let id = self.cur.expect_int()?;
            self.cur.expect_punct(':')?;
            Some(id)
        } else {
            None
        };
        let requiredness = if self.cur.eat_keyword("required") {
            Requiredness::Required
        } else if self.cur.eat_keyword("optional") {
            Requiredness::Optional
        } else {
            Requiredness::Default
        };
        let ty = self.field_type()?;
        let mut annotations = self.annotations()?;
        let name = self.cur.expect_ident()?;
        if self.cur.eat_punct('=') {
            self.cur.skip_value()?;
        }
        let trailing = self.annotations()?;
        self.merge(&mut annotations, trailing)?;
        self.cur.eat_separator();
        Ok(Field {
            id,
            name,
            ty,
            requiredness,
            annotations,
        })
    }

    fn field_list(&mut self, close: char) -> Result<Vec<Field>, GenError> {
        let mut fields = Vec::new();
        while !self.cur.eat_punct(close) {
            fields.push(self.field()?);
        }
        Ok(fields)
    }

    fn structure(&mut self, kind: TypeKind) -> Result<TypeDecl, GenError> {
        let name = self.cur.expect_ident()?;
        self.cur.eat_keyword("xsd_all");
        self.cur.expect_punct('{')?;
        let mut decl = TypeDecl::new(name, kind);
        decl.fields = self.field_list('}')?;
        decl.annotations = self.annotations()?;
        Ok(decl)
    }

    fn enumeration(&mut self) -> Result<TypeDecl, GenError> {
        let name = self.cur.expect_ident()?;
        self.cur.expect_punct('{')?;
        let mut decl = TypeDecl::new(name, TypeKind::Enum);
        while !self.cur.eat_punct('}') {
            let member = match self.cur.next()? {
                Token::Ident(member) => member.clone(),
                // senum members are bare strings
                Token::Str(member) => member.clone(),
                other => return Err(self.cur.error(format!("unexpected {other:?} in enum"))),
            };
            let value = if self.cur.eat_punct('=') {
                Some(self.cur.expect_int()?)
            } else {
                None
            };
            self.annotations()?;
            self.cur.eat_separator();
            decl.values.push((member, value));
        }
        decl.annotations = self.annotations()?;
        Ok(decl)
    }

    fn service(&mut self) -> Result<Service, GenError> {
        let name = self.cur.expect_ident()?;
        let extends = if self.cur.eat_keyword("extends") {
            Some(self.cur.expect_ident()?)
        } else {
            None
        };
        self.cur.expect_punct('{')?;
        let mut functions = Vec::new();
        while !self.cur.eat_punct('}') {
            functions.push(self.function()?);
        }
        let annotations = self.annotations()?;
        Ok(Service {
            name,
            extends,
            functions,
            annotations,
        })
    }

    fn function(&mut self) -> Result<Function, GenError> {
        let oneway = self.cur.eat_keyword("oneway");
        let return_type = if self.cur.eat_keyword("void") {
            None
        } else {
            Some(self.field_type()?)
        };
        let name = self.cur.expect_ident()?;
        self.cur.expect_punct('(')?;
        let arguments = self.field_list(')')?;
        let exceptions = if self.cur.eat_keyword("throws") {
            self.cur.expect_punct('(')?;
            self.field_list(')')?
        } else {
            Vec::new()
        };
        let annotations = self.annotations()?;
        self.cur.eat_separator();
        Ok(Function {
            name,
            arguments,
            return_type,
            exceptions,
            annotations,
            oneway,
            client_streaming: false,
            server_streaming: false,
            boxed: false,
        })
    }
}
