//! Type codes for the .NET type system, shared by both runtimes

use serde::Serialize;

const PTR: usize = std::mem::size_of::<usize>();

/// Element type of a managed type, as far as native code cares about it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeCode {
    VOID,
    BOOLEAN,
    CHAR,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    I,
    U,
    STRING,
    OBJECT,
    PTR,
    SZARRAY,
    VALUETYPE,
    CLASS,
}

impl TypeCode {
    /// Map a fully qualified managed type name to its code.
    /// Returns `None` for anything that is not a built-in.
    pub fn from_type_name(name: &str) -> Option<TypeCode> {
        let code = match name {
            "System.Void" => TypeCode::VOID,
            "System.Boolean" => TypeCode::BOOLEAN,
            "System.Char" => TypeCode::CHAR,
            "System.SByte" => TypeCode::I1,
            "System.Byte" => TypeCode::U1,
            "System.Int16" => TypeCode::I2,
            "System.UInt16" => TypeCode::U2,
            "System.Int32" => TypeCode::I4,
            "System.UInt32" => TypeCode::U4,
            "System.Int64" => TypeCode::I8,
            "System.UInt64" => TypeCode::U8,
            "System.Single" => TypeCode::R4,
            "System.Double" => TypeCode::R8,
            "System.IntPtr" => TypeCode::I,
            "System.UIntPtr" => TypeCode::U,
            "System.String" => TypeCode::STRING,
            "System.Object" => TypeCode::OBJECT,
            _ if name.ends_with('*') => TypeCode::PTR,
            _ if name.ends_with("[]") => TypeCode::SZARRAY,
            _ => return None,
        };
        Some(code)
    }

    /// Size in bytes of a value of this type when stored in a field.
    /// `None` for value types, whose size the runtime has to report.
    pub fn size(&self) -> Option<usize> {
        match self {
            TypeCode::VOID => Some(0),
            TypeCode::BOOLEAN | TypeCode::I1 | TypeCode::U1 => Some(1),
            TypeCode::CHAR | TypeCode::I2 | TypeCode::U2 => Some(2),
            TypeCode::I4 | TypeCode::U4 | TypeCode::R4 => Some(4),
            TypeCode::I8 | TypeCode::U8 | TypeCode::R8 => Some(8),
            TypeCode::VALUETYPE => None,
            _ => Some(PTR),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeCode::BOOLEAN
                | TypeCode::CHAR
                | TypeCode::I1
                | TypeCode::U1
                | TypeCode::I2
                | TypeCode::U2
                | TypeCode::I4
                | TypeCode::U4
                | TypeCode::I8
                | TypeCode::U8
                | TypeCode::R4
                | TypeCode::R8
                | TypeCode::I
                | TypeCode::U
        )
    }

    /// Values of these types are boxed when they cross a reflection call
    pub fn is_value(&self) -> bool {
        self.is_primitive() || matches!(self, TypeCode::VALUETYPE | TypeCode::PTR)
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            TypeCode::STRING | TypeCode::OBJECT | TypeCode::SZARRAY | TypeCode::CLASS
        )
    }

    /// C spelling used by the layout header export
    pub fn c_type(&self) -> &'static str {
        match self {
            TypeCode::VOID => "void",
            TypeCode::BOOLEAN => "bool",
            TypeCode::CHAR => "char16_t",
            TypeCode::I1 => "int8_t",
            TypeCode::U1 => "uint8_t",
            TypeCode::I2 => "int16_t",
            TypeCode::U2 => "uint16_t",
            TypeCode::I4 => "int32_t",
            TypeCode::U4 => "uint32_t",
            TypeCode::I8 => "int64_t",
            TypeCode::U8 => "uint64_t",
            TypeCode::R4 => "float",
            TypeCode::R8 => "double",
            TypeCode::I => "intptr_t",
            TypeCode::U => "uintptr_t",
            TypeCode::VALUETYPE => "uint8_t",
            _ => "void*",
        }
    }
}
