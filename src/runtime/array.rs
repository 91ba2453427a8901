use ndarray::Array1;
use crate::types::ResolvedType;
use super::library::DevicePointer;


/// Host copy of an array, stored with the element type the generated code uses
#[derive(Debug, Clone, PartialEq)]
pub enum HostData {
    Bool(Array1<u8>),
    Int8(Array1<i8>),
    Int16(Array1<i16>),
    Int32(Array1<i32>),
    Uint8(Array1<u8>),
    Uint16(Array1<u16>),
    Uint32(Array1<u32>),
    Float(Array1<f32>),
    Double(Array1<f64>),
}

macro_rules! for_each_variant {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            HostData::Bool($values) => $body,
            HostData::Int8($values) => $body,
            HostData::Int16($values) => $body,
            HostData::Int32($values) => $body,
            HostData::Uint8($values) => $body,
            HostData::Uint16($values) => $body,
            HostData::Uint32($values) => $body,
            HostData::Float($values) => $body,
            HostData::Double($values) => $body,
        }
    };
}

macro_rules! copy_from_ne_bytes {
    ($values:expr, $t:ty, $bytes:expr) => {
        for (value, chunk) in $values.iter_mut().zip($bytes.chunks_exact(std::mem::size_of::<$t>())) {
            let mut raw = [0u8; std::mem::size_of::<$t>()];
            raw.copy_from_slice(chunk);
            *value = <$t>::from_ne_bytes(raw);
        }
    };
}

impl HostData {
    /// Zeroed storage for `count` elements, `None` if the type has no numeric storage
    pub fn zeros(ty: &ResolvedType, count: usize) -> Option<Self> {
        let name = ty.get_numeric().map(|_| ty.remove_const().get_name())?;
        let data = match name.as_str() {
            "bool" => HostData::Bool(Array1::zeros(count)),
            "int8_t" => HostData::Int8(Array1::zeros(count)),
            "int16_t" => HostData::Int16(Array1::zeros(count)),
            "int32_t" => HostData::Int32(Array1::zeros(count)),
            "uint8_t" => HostData::Uint8(Array1::zeros(count)),
            "uint16_t" => HostData::Uint16(Array1::zeros(count)),
            "uint32_t" => HostData::Uint32(Array1::zeros(count)),
            "float" => HostData::Float(Array1::zeros(count)),
            "double" => HostData::Double(Array1::zeros(count)),
            _ => return None,
        };

        Some(data)
    }

    pub fn len(&self) -> usize {
        for_each_variant!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_size(&self) -> usize {
        match self {
            HostData::Bool(_) | HostData::Int8(_) | HostData::Uint8(_) => 1,
            HostData::Int16(_) | HostData::Uint16(_) => 2,
            HostData::Int32(_) | HostData::Uint32(_) | HostData::Float(_) => 4,
            HostData::Double(_) => 8,
        }
    }

    /// Native endian bytes, in the layout the device expects
    pub fn to_bytes(&self) -> Vec<u8> {
        for_each_variant!(self, values => values.iter().flat_map(|v| v.to_ne_bytes()).collect())
    }

    /// Overwrites every element from native endian bytes
    pub fn copy_from_bytes(&mut self, bytes: &[u8]) {
        match self {
            HostData::Bool(values) | HostData::Uint8(values) => copy_from_ne_bytes!(values, u8, bytes),
            HostData::Int8(values) => copy_from_ne_bytes!(values, i8, bytes),
            HostData::Int16(values) => copy_from_ne_bytes!(values, i16, bytes),
            HostData::Int32(values) => copy_from_ne_bytes!(values, i32, bytes),
            HostData::Uint16(values) => copy_from_ne_bytes!(values, u16, bytes),
            HostData::Uint32(values) => copy_from_ne_bytes!(values, u32, bytes),
            HostData::Float(values) => copy_from_ne_bytes!(values, f32, bytes),
            HostData::Double(values) => copy_from_ne_bytes!(values, f64, bytes),
        }
    }

    /// Values converted to `f64`
    pub fn to_f64(&self) -> Array1<f64> {
        for_each_variant!(self, values => values.mapv(|v| v as f64))
    }

    /// Sets every element from `f64` values, converting to the element type
    pub fn set_from_f64(&mut self, new_values: &[f64]) {
        match self {
            HostData::Bool(values) => values.iter_mut().zip(new_values).for_each(|(v, n)| *v = (*n != 0.0) as u8),
            HostData::Int8(values) => values.iter_mut().zip(new_values).for_each(|(v, n)| *v = *n as i8),
            HostData::Int16(values) => values.iter_mut().zip(new_values).for_each(|(v, n)| *v = *n as i16),
            HostData::Int32(values) => values.iter_mut().zip(new_values).for_each(|(v, n)| *v = *n as i32),
            HostData::Uint8(values) => values.iter_mut().zip(new_values).for_each(|(v, n)| *v = *n as u8),
            HostData::Uint16(values) => values.iter_mut().zip(new_values).for_each(|(v, n)| *v = *n as u16),
            HostData::Uint32(values) => values.iter_mut().zip(new_values).for_each(|(v, n)| *v = *n as u32),
            HostData::Float(values) => values.iter_mut().zip(new_values).for_each(|(v, n)| *v = *n as f32),
            HostData::Double(values) => values.iter_mut().zip(new_values).for_each(|(v, n)| *v = *n),
        }
    }

    pub fn as_u32(&self) -> Option<&Array1<u32>> {
        match self {
            HostData::Uint32(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_u32_mut(&mut self) -> Option<&mut Array1<u32>> {
        match self {
            HostData::Uint32(values) => Some(values),
            _ => None,
        }
    }
}

/// Array owned by the runtime, a host copy and the matching device allocation
#[derive(Debug, Clone)]
pub struct ArrayData {
    pub ty: ResolvedType,
    pub host: HostData,
    pub device: Option<DevicePointer>,
    /// Contents are filled in on the host rather than by an initialisation kernel
    pub uninitialised: bool,
}

impl ArrayData {
    pub fn new(ty: ResolvedType, host: HostData, uninitialised: bool) -> Self {
        ArrayData { ty, host, device: None, uninitialised }
    }

    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.host.len() * self.host.element_size()
    }
}

#[cfg(test)]
mod tests {
    use crate::types::ResolvedType;
    use super::HostData;

    #[test]
    fn test_bytes_survive_device_copy() {
        let mut data = HostData::zeros(&ResolvedType::float(), 4).unwrap();
        data.set_from_f64(&[0.5, -1.0, 2.25, 3.0]);

        let bytes = data.to_bytes();
        assert_eq!(bytes.len(), 16);

        let mut copy = HostData::zeros(&ResolvedType::float(), 4).unwrap();
        copy.copy_from_bytes(&bytes);
        assert_eq!(copy, data);
        assert_eq!(copy.to_f64().to_vec(), vec![0.5, -1.0, 2.25, 3.0]);
    }

    #[test]
    fn test_non_numeric_types_have_no_storage() {
        assert!(HostData::zeros(&ResolvedType::void(), 4).is_none());
        assert!(HostData::zeros(&ResolvedType::uint32().create_pointer(), 4).is_none());
    }
}
