//! Protobuf (proto2/proto3) parser covering messages, enums and services.

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
            if self.cur.eat_punct(';') {
                continue;
            }
            let keyword = self.cur.expect_ident()?;
            match keyword.as_str() {
                "syntax" | "edition" => {
                    self.cur.expect_punct('=')?;
                    self.cur.expect_str()?;
                    self.cur.expect_punct(';')?;
                }
                "package" => {
                    doc.namespace = Some(self.cur.expect_ident()?);
                    self.cur.expect_punct(';')?;
                }
                "import" => {
                    if !self.cur.eat_keyword("public") {
                        self.cur.eat_keyword("weak");
                    }
                    doc.includes.push(self.cur.expect_str()?);
                    self.cur.expect_punct(';')?;
                }
                "option" => {
                    self.option()?;
                }
                "message" => self.message("", &mut doc.types)?,
                "enum" => {
                    let decl = self.enumeration("")?;
                    doc.types.push(decl);
                }
                "service" => doc.services.push(self.service()?),
                "extend" => {
                    self.cur.expect_ident()?;
                    self.skip_block()?;
                }
                other => return Err(self.cur.error(format!("unexpected `{other}` at top level"))),
            }
        }
        Ok(doc)
    }

    /// `option name = value;` or `option (ext).path = value;`, returning `(name, value)`.
    fn option(&mut self) -> Result<(String, String), GenError> {
        let name = self.option_name()?;
        self.cur.expect_punct('=')?;
        let value = self.option_value()?;
        self.cur.expect_punct(';')?;
        Ok((name, value))
    }

    fn option_name(&mut self) -> Result<String, GenError> {
        let mut name = String::new();
        loop {
            if self.cur.eat_punct('(') {
                name.push_str(&self.cur.expect_ident()?);
                self.cur.expect_punct(')')?;
            } else if let Some(Token::Ident(part)) = self.cur.peek() {
                self.cur.next()?;
                name.push_str(part);
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.cur.error("expected option name"));
        }
        Ok(name)
    }

    fn option_value(&mut self) -> Result<String, GenError> {
        match self.cur.peek() {
            Some(Token::Str(s)) => {
                self.cur.next()?;
                Ok(s.clone())
            }
            Some(Token::Number(n)) | Some(Token::Ident(n)) => {
                self.cur.next()?;
                Ok(n.clone())
            }
            _ => {
                self.cur.skip_value()?;
                Ok(String::new())
            }
        }
    }

    /// `[name = value, ...]` after a field number.
    fn field_options(&mut self) -> Result<Annotations, GenError> {
        let mut annotations = Annotations::new();
        if !self.cur.eat_punct('[') {
            return Ok(annotations);
        }
        while !self.cur.eat_punct(']') {
            let name = self.option_name()?;
            self.cur.expect_punct('=')?;
            let value = self.option_value()?;
            insert_annotation(self.path, &mut annotations, name, value)?;
            self.cur.eat_punct(',');
        }
        Ok(annotations)
    }

    fn skip_block(&mut self) -> Result<(), GenError> {
        self.cur.expect_punct('{')?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.cur.next()? {
                Token::Punct('{') => depth += 1,
                Token::Punct('}') => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    fn type_ref(&mut self) -> Result<TypeRef, GenError> {
        let name = self.cur.expect_ident()?;
        if name == "map" {
            self.cur.expect_punct('<')?;
            let key = Box::new(self.type_ref()?);
            self.cur.expect_punct(',')?;
            let value = Box::new(self.type_ref()?);
            self.cur.expect_punct('>')?;
            return Ok(TypeRef::Map(key, value));
        }
        Ok(if is_base_type(&name) {
            TypeRef::Base(name)
        } else {
            TypeRef::Named(name)
        })
    }

    fn field(&mut self, label: Option<&str>) -> Result<Field, GenError> {
        let ty = self.type_ref()?;
        let name = self.cur.expect_ident()?;
        self.cur.expect_punct('=')?;
        let id = self.cur.expect_int()?;
        let annotations = self.field_options()?;
        self.cur.expect_punct(';')?;
        let (ty, requiredness) = match label {
            Some("repeated") => (TypeRef::List(Box::new(ty)), Requiredness::Default),
            Some("required") => (ty, Requiredness::Required),
            Some("optional") => (ty, Requiredness::Optional),
            _ => (ty, Requiredness::Default),
        };
        Ok(Field {
            id: Some(id),
            name,
            ty,
            requiredness,
            annotations,
        })
    }

    /// Parse a message body. Nested declarations are flattened as `Outer.Inner`.
    fn message(&mut self, scope: &str, out: &mut Vec<TypeDecl>) -> Result<(), GenError> {
        let name = qualify(scope, &self.cur.expect_ident()?);
        self.cur.expect_punct('{')?;
        let mut decl = TypeDecl::new(name.clone(), TypeKind::Message);
        while !self.cur.eat_punct('}') {
            if self.cur.eat_punct(';') {
                continue;
            }
            match self.cur.peek() {
                Some(Token::Ident(word)) => match word.as_str() {
                    "message" => {
                        self.cur.next()?;
                        self.message(&name, out)?;
                    }
                    "enum" => {
                        self.cur.next()?;
                        let nested = self.enumeration(&name)?;
                        out.push(nested);
                    }
                    "option" => {
                        self.cur.next()?;
                        let (key, value) = self.option()?;
                        insert_annotation(self.path, &mut decl.annotations, key, value)?;
                    }
                    "reserved" | "extensions" => {
                        while !self.cur.eat_punct(';') {
                            self.cur.next()?;
                        }
                    }
                    "extend" => {
                        self.cur.next()?;
                        self.cur.expect_ident()?;
                        self.skip_block()?;
                    }
                    "oneof" => {
                        self.cur.next()?;
                        self.cur.expect_ident()?;
                        self.cur.expect_punct('{')?;
                        while !self.cur.eat_punct('}') {
                            if self.cur.eat_keyword("option") {
                                self.option()?;
                                continue;
                            }
                            let mut field = self.field(None)?;
                            field.requiredness = Requiredness::Optional;
                            decl.fields.push(field);
                        }
                    }
                    "repeated" | "optional" | "required" => {
                        let label = word.clone();
                        self.cur.next()?;
                        let field = self.field(Some(&label))?;
                        decl.fields.push(field);
                    }
                    _ => {
                        let field = self.field(None)?;
                        decl.fields.push(field);
                    }
                },
                _ => return Err(self.cur.error("expected field or declaration in message")),
            }
        }
        out.push(decl);
        Ok(())
    }

    fn enumeration(&mut self, scope: &str) -> Result<TypeDecl, GenError> {
        let name = qualify(scope, &self.cur.expect_ident()?);
        self.cur.expect_punct('{')?;
        let mut decl = TypeDecl::new(name, TypeKind::Enum);
        while !self.cur.eat_punct('}') {
            if self.cur.eat_punct(';') {
                continue;
            }
            if self.cur.eat_keyword("option") {
                let (key, value) = self.option()?;
                insert_annotation(self.path, &mut decl.annotations, key, value)?;
                continue;
            }
            if self.cur.eat_keyword("reserved") {
                while !self.cur.eat_punct(';') {
                    self.cur.next()?;
                }
                continue;
            }
            let member = self.cur.expect_ident()?;
            self.cur.expect_punct('=')?;
            let value = self.cur.expect_int()?;
            self.field_options()?;
            self.cur.expect_punct(';')?;
            decl.values.push((member, Some(value)));
        }
        Ok(decl)
    }

    fn service(&mut self) -> Result<Service, GenError> {
        let name = self.cur.expect_ident()?;
        self.cur.expect_punct('{')?;
        let mut service = Service {
            name,
            extends: None,
            functions: Vec::new(),
            annotations: Annotations::new(),
        };
        while !self.cur.eat_punct('}') {
            if self.cur.eat_punct(';') {
                continue;
            }
            if self.cur.eat_keyword("option") {
                let (key, value) = self.option()?;
                insert_annotation(self.path, &mut service.annotations, key, value)?;
                continue;
            }
            self.cur.expect_keyword("rpc")?;
            service.functions.push(self.rpc()?);
        }
        Ok(service)
    }

    fn rpc(&mut self) -> Result<Function, GenError> {
        let name = self.cur.expect_ident()?;
        self.cur.expect_punct('(')?;
        let client_streaming = self.cur.eat_keyword("stream");
        let request = self.cur.expect_ident()?;
        self.cur.expect_punct(')')?;
        self.cur.expect_keyword("returns")?;
        self.cur.expect_punct('(')?;
        let server_streaming = self.cur.eat_keyword("stream");
        let response = self.cur.expect_ident()?;
        self.cur.expect_punct(')')?;

        let mut annotations = Annotations::new();
        if self.cur.eat_punct('{') {
            while !self.cur.eat_punct('}') {
                if self.cur.eat_punct(';') {
                    continue;
                }
                self.cur.expect_keyword("option")?;
                let (key, value) = self.option()?;
                insert_annotation(self.path, &mut annotations, key, value)?;
            }
        } else {
            self.cur.expect_punct(';')?;
        }

        Ok(Function {
            name,
            arguments: vec![Field {
                id: Some(1),
                name: "request".to_string(),
                ty: TypeRef::Named(request),
                requiredness: Requiredness::Required,
                annotations: Annotations::new(),
            }],
            return_type: Some(TypeRef::Named(response)),
            exceptions: Vec::new(),
            annotations,
            oneway: false,
            client_streaming,
            server_streaming,
            boxed: false,
        })
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}
