use crate::types::{ResolvedType, TypeContext};


/// Function available to model code, emitted through its template
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryFunction {
    pub name: &'static str,
    pub ty: ResolvedType,
    pub template: String,
}

const UNARY_MATH: [&str; 14] = [
    "exp", "expm1", "log", "log1p", "sqrt", "sin", "cos", "tan",
    "tanh", "fabs", "floor", "ceil", "round", "erf",
];

const BINARY_MATH: [&str; 5] = ["fmax", "fmin", "pow", "fmod", "atan2"];

/// Maths functions over the scalar type
pub fn math_functions(context: &TypeContext) -> Vec<LibraryFunction> {
    let scalar = context.scalar.clone();

    let unary = UNARY_MATH.iter().map(|name| LibraryFunction {
        name,
        ty: ResolvedType::function(scalar.clone(), vec![scalar.clone()]),
        template: format!("{}($(0))", name),
    });
    let binary = BINARY_MATH.iter().map(|name| LibraryFunction {
        name,
        ty: ResolvedType::function(scalar.clone(), vec![scalar.clone(), scalar.clone()]),
        template: format!("{}($(0), $(1))", name),
    });

    unary.chain(binary).collect()
}
