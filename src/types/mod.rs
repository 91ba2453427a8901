//! Resolved C-like types used by the front end and during code generation,
//! along with the integer promotion and usual arithmetic conversion rules.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::collections::BTreeSet;
use sha2::Sha256;
use crate::utils::UpdateHash;


/// Numeric properties of a value type
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Numeric {
    /// Conversion rank, higher ranks can represent lower ranks
    pub rank: u32,
    pub min: f64,
    pub max: f64,
    pub lowest: f64,
    /// Digits needed to print the value without loss
    pub max_digits10: usize,
    pub is_signed: bool,
    pub is_integral: bool,
    /// Suffix appended to literals of this type
    pub literal_suffix: &'static str,
}

/// Value type such as `float` or `uint32_t`
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub size: usize,
    pub name: &'static str,
    pub numeric: Option<Numeric>,
}

/// Type detail of a [`ResolvedType`]
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDetail {
    Value(Value),
    Pointer(Box<ResolvedType>),
    Function {
        return_type: Box<ResolvedType>,
        arg_types: Vec<ResolvedType>,
    },
}

/// Fully resolved type with optional `const` qualifier
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    pub is_const: bool,
    pub detail: TypeDetail,
}

macro_rules! numeric_type {
    ($fn_name:ident, $t:ty, $name:expr, $rank:expr, $suffix:expr, $digits:expr, $integral:expr) => {
        pub fn $fn_name() -> ResolvedType {
            ResolvedType {
                is_const: false,
                detail: TypeDetail::Value(Value {
                    size: std::mem::size_of::<$t>(),
                    name: $name,
                    numeric: Some(Numeric {
                        rank: $rank,
                        min: <$t>::MIN as f64,
                        max: <$t>::MAX as f64,
                        lowest: <$t>::MIN as f64,
                        max_digits10: $digits,
                        is_signed: <$t>::MIN as f64 != 0.,
                        is_integral: $integral,
                        literal_suffix: $suffix,
                    }),
                }),
            }
        }
    };
}

impl ResolvedType {
    numeric_type!(int8, i8, "int8_t", 10, "", 3, true);
    numeric_type!(int16, i16, "int16_t", 20, "", 5, true);
    numeric_type!(int32, i32, "int32_t", 30, "", 10, true);
    numeric_type!(uint8, u8, "uint8_t", 10, "u", 3, true);
    numeric_type!(uint16, u16, "uint16_t", 20, "u", 5, true);
    numeric_type!(uint32, u32, "uint32_t", 30, "u", 10, true);
    numeric_type!(float, f32, "float", 50, "f", 9, false);
    numeric_type!(double, f64, "double", 60, "", 17, false);

    pub fn bool() -> ResolvedType {
        ResolvedType {
            is_const: false,
            detail: TypeDetail::Value(Value {
                size: 1,
                name: "bool",
                numeric: Some(Numeric {
                    rank: 0,
                    min: 0.,
                    max: 1.,
                    lowest: 0.,
                    max_digits10: 1,
                    is_signed: false,
                    is_integral: true,
                    literal_suffix: "",
                }),
            }),
        }
    }

    pub fn void() -> ResolvedType {
        ResolvedType {
            is_const: false,
            detail: TypeDetail::Value(Value { size: 0, name: "void", numeric: None }),
        }
    }

    pub fn function(return_type: ResolvedType, arg_types: Vec<ResolvedType>) -> ResolvedType {
        ResolvedType {
            is_const: false,
            detail: TypeDetail::Function { return_type: Box::new(return_type), arg_types },
        }
    }

    pub fn create_pointer(&self) -> ResolvedType {
        ResolvedType { is_const: false, detail: TypeDetail::Pointer(Box::new(self.clone())) }
    }

    pub fn add_const(&self) -> ResolvedType {
        ResolvedType { is_const: true, detail: self.detail.clone() }
    }

    pub fn remove_const(&self) -> ResolvedType {
        ResolvedType { is_const: false, detail: self.detail.clone() }
    }

    pub fn is_value(&self) -> bool {
        matches!(self.detail, TypeDetail::Value(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.detail, TypeDetail::Pointer(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self.detail, TypeDetail::Function { .. })
    }

    pub fn is_numeric(&self) -> bool {
        self.get_numeric().is_some()
    }

    pub fn is_void(&self) -> bool {
        matches!(&self.detail, TypeDetail::Value(v) if v.size == 0)
    }

    pub fn get_numeric(&self) -> Option<&Numeric> {
        match &self.detail {
            TypeDetail::Value(value) => value.numeric.as_ref(),
            _ => None,
        }
    }

    /// Type being pointed to if this is a pointer
    pub fn get_pointee(&self) -> Option<&ResolvedType> {
        match &self.detail {
            TypeDetail::Pointer(value_type) => Some(value_type),
            _ => None,
        }
    }

    /// Size in bytes, pointers use the given pointer width
    pub fn get_size(&self, pointer_bytes: usize) -> usize {
        match &self.detail {
            TypeDetail::Value(value) => value.size,
            TypeDetail::Pointer(_) => pointer_bytes,
            TypeDetail::Function { .. } => 0,
        }
    }

    /// C spelling of the type, suitable for declarations
    pub fn get_name(&self) -> String {
        let qualifier = if self.is_const { "const " } else { "" };
        match &self.detail {
            TypeDetail::Value(value) => format!("{}{}", qualifier, value.name),
            TypeDetail::Pointer(value_type) => format!("{}*{}", value_type.get_name(), if self.is_const { " const" } else { "" }),
            TypeDetail::Function { return_type, arg_types } => {
                let args: Vec<String> = arg_types.iter().map(|a| a.get_name()).collect();
                format!("{}({})", return_type.get_name(), args.join(", "))
            },
        }
    }

    /// Type equality ignoring top-level `const`
    pub fn same_unqualified(&self, other: &ResolvedType) -> bool {
        self.detail == other.detail
    }

    /// Write numeric value as a literal of this type without losing precision
    pub fn write_numeric(&self, value: f64) -> String {
        match self.get_numeric() {
            Some(numeric) if numeric.is_integral => {
                if numeric.rank == 0 {
                    if value != 0. { "true".to_string() } else { "false".to_string() }
                } else if numeric.is_signed {
                    format!("{}{}", value as i64, numeric.literal_suffix)
                } else {
                    format!("{}{}", value as u64, numeric.literal_suffix)
                }
            },
            Some(numeric) => {
                let precision = numeric.max_digits10;
                format!("{:.*e}{}", precision, value, numeric.literal_suffix)
            },
            None => value.to_string(),
        }
    }
}

impl Display for ResolvedType {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.get_name())
    }
}

impl UpdateHash for ResolvedType {
    fn update_hash(&self, hasher: &mut Sha256) {
        self.is_const.update_hash(hasher);
        match &self.detail {
            TypeDetail::Value(value) => {
                0u8.update_hash(hasher);
                value.name.update_hash(hasher);
                value.size.update_hash(hasher);
            },
            TypeDetail::Pointer(value_type) => {
                1u8.update_hash(hasher);
                value_type.update_hash(hasher);
            },
            TypeDetail::Function { return_type, arg_types } => {
                2u8.update_hash(hasher);
                return_type.update_hash(hasher);
                arg_types.update_hash(hasher);
            },
        }
    }
}

/// Typedefs which user code may refer to such as `scalar` and `timepoint`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeContext {
    pub scalar: ResolvedType,
    pub timepoint: ResolvedType,
}

impl Default for TypeContext {
    fn default() -> Self {
        TypeContext { scalar: ResolvedType::float(), timepoint: ResolvedType::float() }
    }
}

impl TypeContext {
    /// Looks up typedef names
    pub fn get(&self, name: &str) -> Option<&ResolvedType> {
        match name {
            "scalar" => Some(&self.scalar),
            "timepoint" => Some(&self.timepoint),
            _ => None,
        }
    }
}

/// Resolves a set of type specifiers (e.g. `unsigned` and `int`) to a numeric type
pub fn get_numeric_type(specifiers: &BTreeSet<String>, context: &TypeContext) -> Option<ResolvedType> {
    let has = |s: &str| specifiers.contains(s);

    if specifiers.len() == 1 {
        let single = specifiers.iter().next()?;
        if let Some(typedef) = context.get(single) {
            return Some(typedef.clone());
        }
    }

    let unsigned = has("unsigned");
    let mut rest: Vec<&str> = specifiers.iter()
        .map(|s| s.as_str())
        .filter(|s| *s != "unsigned" && *s != "signed")
        .collect();
    rest.sort_unstable();

    let resolved = match (unsigned, rest.as_slice()) {
        (false, ["bool"]) => ResolvedType::bool(),
        (false, ["char"]) | (false, ["int8_t"]) => ResolvedType::int8(),
        (true, ["char"]) | (false, ["uint8_t"]) => ResolvedType::uint8(),
        (false, ["short"]) | (false, ["int", "short"]) | (false, ["int16_t"]) => ResolvedType::int16(),
        (true, ["short"]) | (true, ["int", "short"]) | (false, ["uint16_t"]) => ResolvedType::uint16(),
        (false, ["int"]) | (false, ["int32_t"]) => ResolvedType::int32(),
        (true, ["int"]) | (true, []) | (false, ["uint32_t"]) => ResolvedType::uint32(),
        (false, []) if has("signed") => ResolvedType::int32(),
        (false, ["float"]) => ResolvedType::float(),
        (false, ["double"]) => ResolvedType::double(),
        _ => return None,
    };

    Some(resolved)
}

/// Parses a type string such as `"unsigned int"`, `"scalar*"` or `"const float"`
pub fn parse_type(type_string: &str, context: &TypeContext) -> Option<ResolvedType> {
    let trimmed = type_string.trim();
    let (is_pointer, value_part) = match trimmed.strip_suffix('*') {
        Some(stripped) => (true, stripped.trim()),
        None => (false, trimmed),
    };

    let mut is_const = false;
    let mut specifiers = BTreeSet::new();
    for word in value_part.split_whitespace() {
        if word == "const" {
            is_const = true;
        } else {
            specifiers.insert(word.to_string());
        }
    }

    let value_type = get_numeric_type(&specifiers, context)?;
    let value_type = if is_const { value_type.add_const() } else { value_type };

    if is_pointer {
        Some(value_type.create_pointer())
    } else {
        Some(value_type)
    }
}

/// Applies integer promotion: integral types narrower than `int` become `int`
pub fn get_promoted_type(ty: &ResolvedType) -> ResolvedType {
    match ty.get_numeric() {
        Some(numeric) if numeric.is_integral && numeric.rank < ResolvedType::int32_rank() => {
            ResolvedType::int32()
        },
        _ => ty.remove_const(),
    }
}

impl ResolvedType {
    fn int32_rank() -> u32 {
        30
    }

    fn to_unsigned(&self) -> ResolvedType {
        match self.get_numeric().map(|n| n.rank) {
            Some(10) => ResolvedType::uint8(),
            Some(20) => ResolvedType::uint16(),
            _ => ResolvedType::uint32(),
        }
    }
}

/// Usual arithmetic conversions between two numeric types
pub fn get_common_type(a: &ResolvedType, b: &ResolvedType) -> Option<ResolvedType> {
    let a_numeric = a.get_numeric()?;
    let b_numeric = b.get_numeric()?;

    // Floating point types dominate
    if !a_numeric.is_integral || !b_numeric.is_integral {
        let a_rank = if a_numeric.is_integral { 0 } else { a_numeric.rank };
        let b_rank = if b_numeric.is_integral { 0 } else { b_numeric.rank };
        return Some(if a_rank >= b_rank { a.remove_const() } else { b.remove_const() });
    }

    let a_promoted = get_promoted_type(a);
    let b_promoted = get_promoted_type(b);
    if a_promoted.same_unqualified(&b_promoted) {
        return Some(a_promoted);
    }

    let a_num = a_promoted.get_numeric()?;
    let b_num = b_promoted.get_numeric()?;
    if a_num.is_signed == b_num.is_signed {
        return Some(if a_num.rank >= b_num.rank { a_promoted } else { b_promoted });
    }

    let (signed, signed_num, unsigned, unsigned_num) = if a_num.is_signed {
        (&a_promoted, a_num, &b_promoted, b_num)
    } else {
        (&b_promoted, b_num, &a_promoted, a_num)
    };

    if unsigned_num.rank >= signed_num.rank {
        Some(unsigned.clone())
    } else if signed_num.max >= unsigned_num.max {
        Some(signed.clone())
    } else {
        Some(signed.to_unsigned())
    }
}

/// Can a value of type `from` be implicitly converted to `to`
pub fn is_implicitly_convertible(from: &ResolvedType, to: &ResolvedType) -> bool {
    if from.is_numeric() && to.is_numeric() {
        return true;
    }

    match (from.get_pointee(), to.get_pointee()) {
        (Some(from_value), Some(to_value)) => {
            // Adding const to the pointee is allowed, removing it is not
            from_value.same_unqualified(to_value) && (to_value.is_const || !from_value.is_const)
        },
        _ => from.same_unqualified(to),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion() {
        assert_eq!(get_promoted_type(&ResolvedType::int8()), ResolvedType::int32());
        assert_eq!(get_promoted_type(&ResolvedType::uint16()), ResolvedType::int32());
        assert_eq!(get_promoted_type(&ResolvedType::bool()), ResolvedType::int32());
        assert_eq!(get_promoted_type(&ResolvedType::uint32()), ResolvedType::uint32());
        assert_eq!(get_promoted_type(&ResolvedType::float()), ResolvedType::float());
    }

    #[test]
    fn test_common_type() {
        let common = |a: ResolvedType, b: ResolvedType| get_common_type(&a, &b).unwrap();

        assert_eq!(common(ResolvedType::int32(), ResolvedType::float()), ResolvedType::float());
        assert_eq!(common(ResolvedType::float(), ResolvedType::double()), ResolvedType::double());
        assert_eq!(common(ResolvedType::int32(), ResolvedType::uint32()), ResolvedType::uint32());
        assert_eq!(common(ResolvedType::int16(), ResolvedType::uint8()), ResolvedType::int32());
        assert_eq!(common(ResolvedType::int32().add_const(), ResolvedType::int8()), ResolvedType::int32());
        assert!(get_common_type(&ResolvedType::float().create_pointer(), &ResolvedType::float()).is_none());
    }

    #[test]
    fn test_parse_type() {
        let context = TypeContext { scalar: ResolvedType::double(), timepoint: ResolvedType::double() };

        assert_eq!(parse_type("unsigned int", &context), Some(ResolvedType::uint32()));
        assert_eq!(parse_type("scalar", &context), Some(ResolvedType::double()));
        assert_eq!(parse_type("scalar*", &context), Some(ResolvedType::double().create_pointer()));
        assert_eq!(parse_type("const float", &context), Some(ResolvedType::float().add_const()));
        assert_eq!(parse_type("banana", &context), None);
    }

    #[test]
    fn test_names_and_literals() {
        assert_eq!(ResolvedType::float().add_const().create_pointer().get_name(), "const float*");
        assert_eq!(ResolvedType::uint32().write_numeric(7.), "7u");
        assert_eq!(ResolvedType::int32().write_numeric(-3.), "-3");
        assert!(ResolvedType::float().write_numeric(0.5).ends_with('f'));
        assert!(ResolvedType::double().write_numeric(0.5).starts_with("5.0"));
    }
}
