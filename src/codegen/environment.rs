use std::cell::Cell;
use std::collections::HashMap;
use crate::error::FrontEndError;
use crate::transpiler::error_handler::ErrorHandlerBase;
use crate::transpiler::pretty_printer::{print_expression, print_statements, PrettyPrintEnvironment};
use crate::transpiler::standard_library::math_functions;
use crate::transpiler::token::Token;
use crate::transpiler::type_checker::TypeCheckEnvironment;
use crate::transpiler::{compile_expression, compile_statements};
use crate::types::{ResolvedType, TypeContext};


#[derive(Debug, Clone)]
struct Entry {
    ty: ResolvedType,
    value: String,
    /// Emitted before the code if the name is used
    initialiser: Option<String>,
    /// Emitted after the code if the name is used
    finaliser: Option<String>,
    /// Names marked as used along with this one
    dependencies: Vec<String>,
    used: Cell<bool>,
}

/// Scope chain mapping names in model code to the C text they become.
/// Lazily initialised entries only produce their initialiser and
/// finaliser when model code actually refers to them.
#[derive(Debug)]
pub struct Environment<'p> {
    enclosing: Option<&'p Environment<'p>>,
    context: TypeContext,
    names: HashMap<String, usize>,
    entries: Vec<Entry>,
}

impl Environment<'static> {
    pub fn new(context: &TypeContext) -> Self {
        Environment { enclosing: None, context: context.clone(), names: HashMap::new(), entries: vec![] }
    }
}

impl<'p> Environment<'p> {
    /// Scope nested inside this one, names added to it shadow this scope's
    pub fn nested(&'p self) -> Environment<'p> {
        Environment { enclosing: Some(self), context: self.context.clone(), names: HashMap::new(), entries: vec![] }
    }

    pub fn context(&self) -> &TypeContext {
        &self.context
    }

    fn insert(&mut self, name: &str, entry: Entry) {
        match self.names.get(name) {
            Some(&index) => self.entries[index] = entry,
            None => {
                self.names.insert(name.to_string(), self.entries.len());
                self.entries.push(entry);
            },
        }
    }

    pub fn add(&mut self, name: &str, ty: ResolvedType, value: &str) {
        self.add_full(name, ty, value, None, None, vec![]);
    }

    /// Adds a name whose initialiser and finaliser are only emitted if it is used
    pub fn add_lazy(&mut self, name: &str, ty: ResolvedType, value: &str, initialiser: String, finaliser: Option<String>) {
        self.add_full(name, ty, value, Some(initialiser), finaliser, vec![]);
    }

    pub fn add_full(
        &mut self,
        name: &str,
        ty: ResolvedType,
        value: &str,
        initialiser: Option<String>,
        finaliser: Option<String>,
        dependencies: Vec<String>,
    ) {
        self.insert(name, Entry {
            ty,
            value: value.to_string(),
            initialiser,
            finaliser,
            dependencies,
            used: Cell::new(false),
        });
    }

    /// Adds a function, `$(0)` style placeholders in the template are replaced by arguments
    pub fn add_function(&mut self, name: &str, return_type: ResolvedType, arg_types: Vec<ResolvedType>, template: &str) {
        self.add(name, ResolvedType::function(return_type, arg_types), template);
    }

    pub fn add_math_functions(&mut self) {
        for function in math_functions(&self.context) {
            self.add(function.name, function.ty, &function.template);
        }
    }

    fn find(&self, name: &str) -> Option<&Entry> {
        match self.names.get(name) {
            Some(&index) => Some(&self.entries[index]),
            None => self.enclosing.and_then(|e| e.find(name)),
        }
    }

    fn mark_used(&self, name: &str) {
        if let Some(entry) = self.find(name) {
            if !entry.used.replace(true) {
                for dependency in &entry.dependencies {
                    self.mark_used(dependency);
                }
            }
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.find(name).map_or(false, |e| e.used.get())
    }

    /// Value of a name, marking it as used
    pub fn get(&self, name: &str) -> Option<String> {
        self.mark_used(name);
        self.find(name).map(|e| e.value.clone())
    }

    /// Initialisers of the used names in this scope, in the order they were added
    pub fn preamble(&self) -> String {
        self.entries.iter()
            .filter(|e| e.used.get())
            .filter_map(|e| e.initialiser.as_deref())
            .map(|i| format!("{}\n", i))
            .collect()
    }

    pub fn postamble(&self) -> String {
        self.entries.iter()
            .filter(|e| e.used.get())
            .filter_map(|e| e.finaliser.as_deref())
            .map(|f| format!("{}\n", f))
            .collect()
    }

    /// Type checks and prints a statement list
    pub fn print_code(&mut self, tokens: &[Token], description: &str) -> Result<String, FrontEndError> {
        let context = self.context.clone();
        let (statements, _) = compile_statements(tokens, self, &context, description)?;

        Ok(print_statements(&statements, self, &context))
    }

    /// Type checks and prints a single expression
    pub fn print_expression(&mut self, tokens: &[Token], description: &str) -> Result<String, FrontEndError> {
        let context = self.context.clone();
        let (expression, _) = compile_expression(tokens, self, &context, description)?;

        Ok(print_expression(&expression, self, &context))
    }
}

impl TypeCheckEnvironment for Environment<'_> {
    fn define(&mut self, name: &Token, ty: ResolvedType, error_handler: &mut dyn ErrorHandlerBase) {
        if self.names.contains_key(&name.lexeme) {
            error_handler.error_at(name, "Redeclaration of variable");
        } else {
            let value = format!("_{}", name.lexeme);
            self.add(&name.lexeme, ty, &value);
        }
    }

    fn get_type(&self, name: &Token, error_handler: &mut dyn ErrorHandlerBase) -> Option<ResolvedType> {
        match self.find(&name.lexeme) {
            Some(entry) => {
                self.mark_used(&name.lexeme);
                Some(entry.ty.clone())
            },
            None => {
                error_handler.error_at(name, "Undefined identifier");
                None
            },
        }
    }
}

impl PrettyPrintEnvironment for Environment<'_> {
    fn get_name(&mut self, name: &str) -> String {
        self.get(name).unwrap_or_else(|| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::transpiler::scan_code;
    use crate::types::{ResolvedType, TypeContext};
    use super::Environment;

    #[test]
    fn test_lazy_initialiser_only_when_used() {
        let context = TypeContext::default();
        let mut env = Environment::new(&context);
        env.add_lazy("V", ResolvedType::float(), "_lV", "float _lV = group->V[id];".to_string(), Some("group->V[id] = _lV;".to_string()));
        env.add_lazy("U", ResolvedType::float(), "_lU", "float _lU = group->U[id];".to_string(), None);

        let tokens = scan_code("V = 2.0;", "test").unwrap();
        let code = env.print_code(&tokens, "test").unwrap();

        assert_eq!(code.trim(), "_lV = 2.0f;");
        assert_eq!(env.preamble(), "float _lV = group->V[id];\n");
        assert_eq!(env.postamble(), "group->V[id] = _lV;\n");
    }

    #[test]
    fn test_nested_scope_marks_enclosing() {
        let context = TypeContext::default();
        let mut outer = Environment::new(&context);
        outer.add_lazy("x", ResolvedType::int32(), "_lx", "int32_t _lx = 1;".to_string(), None);
        outer.add_function("twice", ResolvedType::int32(), vec![ResolvedType::int32()], "(2 * $(0))");

        {
            let mut inner = outer.nested();
            inner.add("y", ResolvedType::int32(), "3");
            let tokens = scan_code("x = twice(y);", "test").unwrap();
            let code = inner.print_code(&tokens, "test").unwrap();
            assert_eq!(code.trim(), "_lx = (2 * 3);");
        }
        assert!(outer.is_used("x"));
    }

    #[test]
    fn test_undefined_identifier_fails() {
        let context = TypeContext::default();
        let mut env = Environment::new(&context);
        let tokens = scan_code("z = 1;", "test").unwrap();

        assert!(env.print_code(&tokens, "test").is_err());
    }
}
