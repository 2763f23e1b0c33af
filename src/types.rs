use serde_json::Value;

/// Small type system used to check model output before it reaches a client.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Text,
    Bool,
    /// A string restricted to one of the listed values.
    OneOf(&'static [&'static str]),
    /// The inner type, or JSON `null`.
    Nullable(Box<TypeDef>),
    List(Box<TypeDef>),
    Object(Vec<FieldDef>),
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: TypeDef,
    /// Optional fields may be missing from the object entirely.
    pub optional: bool,
}

impl FieldDef {
    pub fn required(name: &'static str, ty: TypeDef) -> Self {
        Self {
            name,
            ty,
            optional: false,
        }
    }

    pub fn optional(name: &'static str, ty: TypeDef) -> Self {
        Self {
            name,
            ty,
            optional: true,
        }
    }
}

impl TypeDef {
    pub fn list(inner: TypeDef) -> Self {
        TypeDef::List(Box::new(inner))
    }

    pub fn nullable(inner: TypeDef) -> Self {
        TypeDef::Nullable(Box::new(inner))
    }
}

/// Single validation error, with a JSON path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field at path {path}")]
    MissingField { path: String },
    #[error("Type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Unexpected value at {path}: {found:?} is not one of {allowed:?}")]
    NotAllowed {
        path: String,
        found: String,
        allowed: &'static [&'static str],
    },
}

/// Validate a serde_json::Value against a TypeDef.
///
/// Returns Ok(()) if everything matches, or Err(vec![]) with one or more errors.
pub fn validate(ty: &TypeDef, value: &Value) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    validate_inner(ty, value, "$", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_inner(ty: &TypeDef, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    use TypeDef::*;

    match ty {
        Text => {
            if !value.is_string() {
                errors.push(mismatch(path, "string", value));
            }
        }
        Bool => {
            if !value.is_boolean() {
                errors.push(mismatch(path, "boolean", value));
            }
        }
        OneOf(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            Some(s) => errors.push(ValidationError::NotAllowed {
                path: path.to_string(),
                found: s.to_string(),
                allowed,
            }),
            None => errors.push(mismatch(path, "string", value)),
        },
        Nullable(inner) => {
            if !value.is_null() {
                validate_inner(inner, value, path, errors);
            }
        }
        List(inner) => {
            if let Value::Array(items) = value {
                for (idx, item) in items.iter().enumerate() {
                    let child_path = format!("{path}[{idx}]");
                    validate_inner(inner, item, &child_path, errors);
                }
            } else {
                errors.push(mismatch(path, "array", value));
            }
        }
        Object(fields) => {
            let Some(obj) = value.as_object() else {
                errors.push(mismatch(path, "object", value));
                return;
            };

            for field in fields {
                let field_path = format!("{path}.{}", field.name);

                match obj.get(field.name) {
                    None if field.optional => {}
                    None => errors.push(ValidationError::MissingField { path: field_path }),
                    Some(v) => validate_inner(&field.ty, v, &field_path, errors),
                }
            }

            // Extra fields are ignored (lenient).
        }
    }
}

fn mismatch(path: &str, expected: &'static str, value: &Value) -> ValidationError {
    ValidationError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: value_type_name(value),
    }
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> TypeDef {
        TypeDef::Object(vec![
            FieldDef::required("name", TypeDef::Text),
            FieldDef::optional("nickname", TypeDef::nullable(TypeDef::Text)),
            FieldDef::required("kind", TypeDef::OneOf(&["a", "b"])),
        ])
    }

    #[test]
    fn optional_and_nullable_fields_accept_absence_and_null() {
        assert!(validate(&person(), &json!({"name": "x", "kind": "a"})).is_ok());
        assert!(validate(&person(), &json!({"name": "x", "nickname": null, "kind": "b"})).is_ok());
    }

    #[test]
    fn reports_every_problem_with_its_path() {
        let errors = validate(&person(), &json!({"nickname": 3, "kind": "c"})).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::MissingField {
            path: "$.name".into()
        }));
        assert!(errors.contains(&ValidationError::TypeMismatch {
            path: "$.nickname".into(),
            expected: "string",
            found: "number",
        }));
        assert!(matches!(&errors[2], ValidationError::NotAllowed { path, .. } if path == "$.kind"));
    }

    #[test]
    fn list_items_are_checked_individually() {
        let ty = TypeDef::list(TypeDef::Bool);
        let errors = validate(&ty, &json!([true, "no", false])).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::TypeMismatch {
                path: "$[1]".into(),
                expected: "boolean",
                found: "string",
            }]
        );
    }
}
