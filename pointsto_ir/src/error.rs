use thiserror::Error;

/// An error building or querying the program model handed to the solver.
#[derive(Debug, Error)]
pub enum IrError {
    /// A type name was referenced that was never declared
    #[error("unknown type `{0}`")]
    UnknownType(String),
    /// A method was referenced by a name that no class declares
    #[error("unknown method `{0}`")]
    UnknownMethod(String),
    /// A field was referenced that neither the class nor any of its supertypes declares
    #[error("unknown field `{field}` in `{class}`")]
    UnknownField { class: String, field: String },
    /// Two classes share one name
    #[error("class `{0}` declared twice")]
    DuplicateClass(String),
    /// Two methods with the same name were declared on one class
    #[error("method `{0}` declared twice")]
    DuplicateMethod(String),
    /// Two fields with the same name were declared on one class
    #[error("field `{class}.{field}` declared twice")]
    DuplicateField { class: String, field: String },
    /// A type name could not be parsed, e.g. a dangling `[`
    #[error("malformed type name `{0}`")]
    MalformedType(String),
    /// A class tried to extend a primitive, an array, or an interface
    #[error("`{0}` cannot be used as a superclass")]
    InvalidSuperclass(String),
    /// A declaration in the program description was missing a required attribute
    #[error("<{element}> is missing required attribute `{attribute}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    /// The program description could not be read from disk
    #[error("unable to read program description")]
    ProgramRead(#[from] std::io::Error),
    /// The program description was read but was not well-formed
    #[error("failed to parse program description")]
    ProgramParse(#[from] serde_xml_rs::Error),
}
