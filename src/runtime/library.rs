use std::collections::BTreeMap;
use std::ffi::c_void;
use std::path::Path;
use libloading::{Library, Symbol};
use crate::error::LibraryError;
use crate::types::ResolvedType;


/// Address of a device allocation made by the generated library
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DevicePointer(pub usize);

impl DevicePointer {
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Value written into one field of a merged group
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PushValue {
    Pointer(DevicePointer),
    Int32(i32),
    Uint32(u32),
    Float(f32),
    Double(f64),
}

impl PushValue {
    /// Converts a scalar to the representation of a field type
    pub fn numeric(ty: &ResolvedType, value: f64) -> Self {
        match ty.remove_const().get_name().as_str() {
            "double" => PushValue::Double(value),
            "float" => PushValue::Float(value as f32),
            "int32_t" | "int16_t" | "int8_t" => PushValue::Int32(value as i32),
            _ => PushValue::Uint32(value as u32),
        }
    }
}

/// Entry points exported by a generated library
pub trait ModelLibrary {
    fn allocate_mem(&mut self) -> Result<(), LibraryError>;

    fn free_mem(&mut self) -> Result<(), LibraryError>;

    fn initialize(&mut self) -> Result<(), LibraryError>;

    fn initialize_sparse(&mut self) -> Result<(), LibraryError>;

    fn initialize_host(&mut self) -> Result<(), LibraryError>;

    fn step_time(&mut self, timestep: u64, num_recording_timesteps: u32) -> Result<(), LibraryError>;

    /// Runs the `update<Group>` entry point of a custom update group
    fn custom_update(&mut self, group: &str) -> Result<(), LibraryError>;

    fn allocate_device_array(&mut self, bytes: usize) -> Result<DevicePointer, LibraryError>;

    fn free_device_array(&mut self, pointer: DevicePointer) -> Result<(), LibraryError>;

    fn push_device_array(&mut self, pointer: DevicePointer, host: &[u8]) -> Result<(), LibraryError>;

    fn pull_device_array(&mut self, pointer: DevicePointer, host: &mut [u8]) -> Result<(), LibraryError>;

    /// Calls a `push<Struct><Field>ToDevice` function
    fn push_merged_field(&mut self, function: &str, index: u32, value: PushValue) -> Result<(), LibraryError>;
}

const REQUIRED_SYMBOLS: [&str; 10] = [
    "allocateMem",
    "freeMem",
    "initialize",
    "initializeSparse",
    "initializeHost",
    "stepTime",
    "allocateDeviceArray",
    "freeDeviceArray",
    "pushDeviceArray",
    "pullDeviceArray",
];

/// Generated code compiled into a shared object
pub struct SharedLibrary {
    library: Library,
}

impl std::fmt::Debug for SharedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedLibrary")
    }
}

impl SharedLibrary {
    /// Opens a library and checks every required entry point and custom update function exists
    pub fn load(path: &Path, custom_update_groups: &[String]) -> Result<Self, LibraryError> {
        let library = unsafe { Library::new(path) }
            .map_err(|e| LibraryError::LoadError(e.to_string()))?;
        let shared = SharedLibrary { library };

        let custom_updates = custom_update_groups.iter().map(|g| format!("update{}", g));
        for name in REQUIRED_SYMBOLS.iter().map(|s| s.to_string()).chain(custom_updates) {
            unsafe { shared.get_symbol::<unsafe extern "C" fn()>(&name)? };
        }

        tracing::info!("loaded generated library {}", path.display());

        Ok(shared)
    }

    unsafe fn get_symbol<T>(&self, name: &str) -> Result<Symbol<'_, T>, LibraryError> {
        let mut symbol = name.as_bytes().to_vec();
        symbol.push(0);

        unsafe {
            self.library.get(&symbol).map_err(|_| LibraryError::MissingSymbol(name.to_string()))
        }
    }

    fn call(&self, name: &str) -> Result<(), LibraryError> {
        unsafe {
            let function: Symbol<unsafe extern "C" fn()> = self.get_symbol(name)?;
            function();
        }

        Ok(())
    }
}

impl ModelLibrary for SharedLibrary {
    fn allocate_mem(&mut self) -> Result<(), LibraryError> {
        self.call("allocateMem")
    }

    fn free_mem(&mut self) -> Result<(), LibraryError> {
        self.call("freeMem")
    }

    fn initialize(&mut self) -> Result<(), LibraryError> {
        self.call("initialize")
    }

    fn initialize_sparse(&mut self) -> Result<(), LibraryError> {
        self.call("initializeSparse")
    }

    fn initialize_host(&mut self) -> Result<(), LibraryError> {
        self.call("initializeHost")
    }

    fn step_time(&mut self, timestep: u64, num_recording_timesteps: u32) -> Result<(), LibraryError> {
        unsafe {
            let function: Symbol<unsafe extern "C" fn(u64, u32)> = self.get_symbol("stepTime")?;
            function(timestep, num_recording_timesteps);
        }

        Ok(())
    }

    fn custom_update(&mut self, group: &str) -> Result<(), LibraryError> {
        self.call(&format!("update{}", group))
    }

    fn allocate_device_array(&mut self, bytes: usize) -> Result<DevicePointer, LibraryError> {
        let pointer = unsafe {
            let function: Symbol<unsafe extern "C" fn(usize) -> *mut c_void> = self.get_symbol("allocateDeviceArray")?;
            function(bytes)
        };

        Ok(DevicePointer(pointer as usize))
    }

    fn free_device_array(&mut self, pointer: DevicePointer) -> Result<(), LibraryError> {
        unsafe {
            let function: Symbol<unsafe extern "C" fn(*mut c_void)> = self.get_symbol("freeDeviceArray")?;
            function(pointer.0 as *mut c_void);
        }

        Ok(())
    }

    fn push_device_array(&mut self, pointer: DevicePointer, host: &[u8]) -> Result<(), LibraryError> {
        unsafe {
            let function: Symbol<unsafe extern "C" fn(*mut c_void, *const c_void, usize)> = self.get_symbol("pushDeviceArray")?;
            function(pointer.0 as *mut c_void, host.as_ptr() as *const c_void, host.len());
        }

        Ok(())
    }

    fn pull_device_array(&mut self, pointer: DevicePointer, host: &mut [u8]) -> Result<(), LibraryError> {
        unsafe {
            let function: Symbol<unsafe extern "C" fn(*const c_void, *mut c_void, usize)> = self.get_symbol("pullDeviceArray")?;
            function(pointer.0 as *const c_void, host.as_mut_ptr() as *mut c_void, host.len());
        }

        Ok(())
    }

    fn push_merged_field(&mut self, function: &str, index: u32, value: PushValue) -> Result<(), LibraryError> {
        unsafe {
            match value {
                PushValue::Pointer(pointer) => {
                    let push: Symbol<unsafe extern "C" fn(u32, *mut c_void)> = self.get_symbol(function)?;
                    push(index, pointer.0 as *mut c_void);
                },
                PushValue::Int32(v) => {
                    let push: Symbol<unsafe extern "C" fn(u32, i32)> = self.get_symbol(function)?;
                    push(index, v);
                },
                PushValue::Uint32(v) => {
                    let push: Symbol<unsafe extern "C" fn(u32, u32)> = self.get_symbol(function)?;
                    push(index, v);
                },
                PushValue::Float(v) => {
                    let push: Symbol<unsafe extern "C" fn(u32, f32)> = self.get_symbol(function)?;
                    push(index, v);
                },
                PushValue::Double(v) => {
                    let push: Symbol<unsafe extern "C" fn(u32, f64)> = self.get_symbol(function)?;
                    push(index, v);
                },
            }
        }

        Ok(())
    }
}

/// Call recorded by [`MockLibrary`]
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryCall {
    AllocateMem,
    FreeMem,
    Initialize,
    InitializeSparse,
    InitializeHost,
    StepTime { timestep: u64, num_recording_timesteps: u32 },
    CustomUpdate(String),
    PushArray(DevicePointer),
    PullArray(DevicePointer),
    PushMergedField { function: String, index: u32, value: PushValue },
}

/// In-memory library which keeps device arrays as byte buffers and records
/// every call, for driving a runtime without compiled code
#[derive(Debug, Default)]
pub struct MockLibrary {
    pub calls: Vec<LibraryCall>,
    pub device: BTreeMap<DevicePointer, Vec<u8>>,
    pub custom_update_groups: Vec<String>,
    next_pointer: usize,
}

impl MockLibrary {
    pub fn new(custom_update_groups: &[String]) -> Self {
        MockLibrary {
            custom_update_groups: custom_update_groups.to_vec(),
            next_pointer: 0x1000,
            ..Default::default()
        }
    }

    /// Device memory behind a pointer, for tests writing results a kernel would produce
    pub fn device_memory_mut(&mut self, pointer: DevicePointer) -> Option<&mut Vec<u8>> {
        self.device.get_mut(&pointer)
    }

    /// Merged field pushes made to one push function
    pub fn pushed_values(&self, function: &str) -> Vec<(u32, PushValue)> {
        self.calls.iter()
            .filter_map(|c| match c {
                LibraryCall::PushMergedField { function: f, index, value } if f == function => Some((*index, *value)),
                _ => None,
            })
            .collect()
    }
}

impl ModelLibrary for MockLibrary {
    fn allocate_mem(&mut self) -> Result<(), LibraryError> {
        self.calls.push(LibraryCall::AllocateMem);
        Ok(())
    }

    fn free_mem(&mut self) -> Result<(), LibraryError> {
        self.calls.push(LibraryCall::FreeMem);
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), LibraryError> {
        self.calls.push(LibraryCall::Initialize);
        Ok(())
    }

    fn initialize_sparse(&mut self) -> Result<(), LibraryError> {
        self.calls.push(LibraryCall::InitializeSparse);
        Ok(())
    }

    fn initialize_host(&mut self) -> Result<(), LibraryError> {
        self.calls.push(LibraryCall::InitializeHost);
        Ok(())
    }

    fn step_time(&mut self, timestep: u64, num_recording_timesteps: u32) -> Result<(), LibraryError> {
        self.calls.push(LibraryCall::StepTime { timestep, num_recording_timesteps });
        Ok(())
    }

    fn custom_update(&mut self, group: &str) -> Result<(), LibraryError> {
        if !self.custom_update_groups.iter().any(|g| g == group) {
            return Err(LibraryError::MissingSymbol(format!("update{}", group)));
        }
        self.calls.push(LibraryCall::CustomUpdate(group.to_string()));
        Ok(())
    }

    fn allocate_device_array(&mut self, bytes: usize) -> Result<DevicePointer, LibraryError> {
        let pointer = DevicePointer(self.next_pointer);
        self.next_pointer += bytes.max(1).next_multiple_of(16);
        self.device.insert(pointer, vec![0; bytes]);
        Ok(pointer)
    }

    fn free_device_array(&mut self, pointer: DevicePointer) -> Result<(), LibraryError> {
        self.device.remove(&pointer);
        Ok(())
    }

    fn push_device_array(&mut self, pointer: DevicePointer, host: &[u8]) -> Result<(), LibraryError> {
        self.calls.push(LibraryCall::PushArray(pointer));
        if let Some(memory) = self.device.get_mut(&pointer) {
            let count = host.len().min(memory.len());
            memory[..count].copy_from_slice(&host[..count]);
        }
        Ok(())
    }

    fn pull_device_array(&mut self, pointer: DevicePointer, host: &mut [u8]) -> Result<(), LibraryError> {
        self.calls.push(LibraryCall::PullArray(pointer));
        if let Some(memory) = self.device.get(&pointer) {
            let count = host.len().min(memory.len());
            host[..count].copy_from_slice(&memory[..count]);
        }
        Ok(())
    }

    fn push_merged_field(&mut self, function: &str, index: u32, value: PushValue) -> Result<(), LibraryError> {
        self.calls.push(LibraryCall::PushMergedField { function: function.to_string(), index, value });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use crate::error::LibraryError;
    use crate::types::ResolvedType;
    use super::{LibraryCall, MockLibrary, ModelLibrary, PushValue, SharedLibrary};

    #[test]
    fn test_missing_library_fails_to_load() {
        let result = SharedLibrary::load(Path::new("/nonexistent/librunner.so"), &[]);

        assert!(matches!(result, Err(LibraryError::LoadError(_))));
    }

    #[test]
    fn test_numeric_values_match_field_type() {
        assert_eq!(PushValue::numeric(&ResolvedType::float(), 0.5), PushValue::Float(0.5));
        assert_eq!(PushValue::numeric(&ResolvedType::double(), 0.5), PushValue::Double(0.5));
        assert_eq!(PushValue::numeric(&ResolvedType::uint32(), 7.0), PushValue::Uint32(7));
    }

    #[test]
    fn test_mock_device_memory_round_trip() {
        let mut library = MockLibrary::new(&["Plasticity".to_string()]);
        let pointer = library.allocate_device_array(12).unwrap();
        assert!(!pointer.is_null());

        library.push_device_array(pointer, &[1, 2, 3, 4]).unwrap();
        let mut host = [0u8; 4];
        library.pull_device_array(pointer, &mut host).unwrap();
        assert_eq!(host, [1, 2, 3, 4]);

        library.custom_update("Plasticity").unwrap();
        assert!(matches!(library.custom_update("Missing"), Err(LibraryError::MissingSymbol(_))));
        assert!(library.calls.contains(&LibraryCall::CustomUpdate("Plasticity".to_string())));
    }
}
