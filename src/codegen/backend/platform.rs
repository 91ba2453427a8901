use crate::models::ReductionOperation;
use crate::types::{ResolvedType, TypeContext};


/// Atomic read-modify-write operations used by generated kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicOperation {
    Add,
    Or,
}

/// Memory an atomic operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySpace {
    Global,
    Shared,
}

/// Argument passed to a kernel launch
#[derive(Debug, Clone, PartialEq)]
pub struct KernelArg {
    pub ty: String,
    pub name: String,
    /// Merged group arrays which some platforms pass to kernels rather than declare globally
    pub merged_array: bool,
}

impl KernelArg {
    pub fn value(ty: &str, name: &str) -> Self {
        KernelArg { ty: ty.to_string(), name: name.to_string(), merged_array: false }
    }

    pub fn merged_array(struct_name: &str, name: &str) -> Self {
        KernelArg { ty: struct_name.to_string(), name: name.to_string(), merged_array: true }
    }
}

/// Dialect specific pieces of SIMT code, everything else is shared between platforms
pub trait SimtPlatform: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Includes and helpers at the top of every generated device source
    fn device_preamble(&self) -> String;

    /// Includes and error checking helpers at the top of the runner
    fn runner_preamble(&self) -> String;

    fn kernel_declaration(&self, name: &str, args: &[KernelArg]) -> String;

    fn thread_id(&self) -> &'static str;

    fn block_id(&self, axis: usize) -> String;

    fn shared_prefix(&self) -> &'static str;

    /// Address space of pointers to global memory inside kernels
    fn pointer_prefix(&self) -> &'static str;

    fn barrier(&self) -> &'static str;

    fn atomic(&self, operation: AtomicOperation, ty: &ResolvedType, memory: MemorySpace) -> String;

    fn clz(&self) -> &'static str;

    /// Folds `value` across a warp, leaving the result in lane zero
    fn warp_reduce(&self, operation: ReductionOperation, value: &str, type_name: &str) -> String;

    /// Declares the merged group array of a struct, returns device and host declarations
    fn merged_group_array(&self, struct_name: &str, array_name: &str, count: usize) -> (String, String);

    /// Host code allocating a merged group array, if it is not statically allocated
    fn merged_group_allocation(&self, struct_name: &str, array_name: &str, count: usize) -> Option<String>;

    /// Does host code need its own copy of merged struct definitions
    fn host_structs_required(&self) -> bool;

    /// Host declarations and functions needed before the kernels of a module can be launched
    fn module_setup(&self, module: &str, kernels: &[String]) -> String;

    /// Declares a constant table of start ids
    fn start_id_table(&self, name: &str, start_ids: &[usize]) -> String;

    /// Host code writing one field of one merged group member
    fn push_field(&self, struct_name: &str, array_name: &str, field: &str, ty: &str) -> String;

    /// Host code launching a kernel over `grid` blocks
    fn launch(&self, kernel: &str, grid: (usize, usize), block_size: usize, args: &[KernelArg]) -> String;

    /// Wraps device code so it can be compiled into the host library
    fn wrap_device_source(&self, name: &str, source: &str) -> String;

    /// Host code allocating, freeing and copying raw device memory
    fn memory_functions(&self) -> String;

    /// Globals the runner owns, along with declarations of per module setup functions
    fn runner_globals(&self, modules: &[String]) -> String;

    /// Host code selecting a device before anything is allocated
    fn device_setup(&self, modules: &[String]) -> String;

    fn synchronise(&self) -> &'static str;

    /// Random number functions model code may call, with their templates
    fn rng_functions(&self, context: &TypeContext) -> Vec<(&'static str, ResolvedType, String)>;

    /// Seeds the per-thread generator `localRNG`
    fn rng_init(&self, seed: u64, sequence: &str, offset: &str) -> String;
}

fn atomic_name(operation: AtomicOperation) -> &'static str {
    match operation {
        AtomicOperation::Add => "Add",
        AtomicOperation::Or => "Or",
    }
}

/// NVIDIA CUDA
#[derive(Debug, Clone, Default)]
pub struct CudaPlatform;

impl SimtPlatform for CudaPlatform {
    fn name(&self) -> &'static str {
        "CUDA"
    }

    fn device_preamble(&self) -> String {
        [
            "#include \"definitions.h\"",
            "#include <cuda_runtime.h>",
            "#include <curand_kernel.h>",
            "#include <cfloat>",
            "#include <climits>",
        ].join("\n")
    }

    fn runner_preamble(&self) -> String {
        [
            "#include \"definitions.h\"",
            "#include <cstdio>",
            "#include <cstdlib>",
            "#include <cuda_runtime.h>",
            "",
            "#define CHECK_RUNTIME_ERRORS(call) {\\",
            "    cudaError_t error = call;\\",
            "    if(error != cudaSuccess) {\\",
            "        fprintf(stderr, \"%s: %i: cuda error %i: %s\\n\", __FILE__, __LINE__, (int)error, cudaGetErrorString(error));\\",
            "        exit(EXIT_FAILURE);\\",
            "    }\\",
            "}",
        ].join("\n")
    }

    fn kernel_declaration(&self, name: &str, args: &[KernelArg]) -> String {
        let args: Vec<String> = args.iter()
            .filter(|a| !a.merged_array)
            .map(|a| format!("{} {}", a.ty, a.name))
            .collect();

        format!("extern \"C\" __global__ void {}({})", name, args.join(", "))
    }

    fn thread_id(&self) -> &'static str {
        "threadIdx.x"
    }

    fn block_id(&self, axis: usize) -> String {
        match axis {
            0 => "blockIdx.x".to_string(),
            1 => "blockIdx.y".to_string(),
            _ => "blockIdx.z".to_string(),
        }
    }

    fn shared_prefix(&self) -> &'static str {
        "__shared__ "
    }

    fn pointer_prefix(&self) -> &'static str {
        ""
    }

    fn barrier(&self) -> &'static str {
        "__syncthreads()"
    }

    fn atomic(&self, operation: AtomicOperation, _ty: &ResolvedType, _memory: MemorySpace) -> String {
        format!("atomic{}", atomic_name(operation))
    }

    fn clz(&self) -> &'static str {
        "__clz"
    }

    fn warp_reduce(&self, operation: ReductionOperation, value: &str, type_name: &str) -> String {
        let shuffled = format!("__shfl_down_sync(0xFFFFFFFF, {}, i)", value);
        [
            "for(unsigned int i = 16; i > 0; i /= 2) {".to_string(),
            format!("{} = {};", value, operation.fold(value, &shuffled, type_name)),
            "}".to_string(),
        ].join("\n")
    }

    fn merged_group_array(&self, struct_name: &str, array_name: &str, count: usize) -> (String, String) {
        (format!("__device__ __constant__ {} {}[{}];", struct_name, array_name, count), String::new())
    }

    fn merged_group_allocation(&self, _struct_name: &str, _array_name: &str, _count: usize) -> Option<String> {
        None
    }

    fn host_structs_required(&self) -> bool {
        false
    }

    fn module_setup(&self, _module: &str, _kernels: &[String]) -> String {
        String::new()
    }

    fn start_id_table(&self, name: &str, start_ids: &[usize]) -> String {
        let ids: Vec<String> = start_ids.iter().map(|i| i.to_string()).collect();
        format!("__device__ __constant__ unsigned int {}[] = {{{}}};", name, ids.join(", "))
    }

    fn push_field(&self, struct_name: &str, array_name: &str, field: &str, ty: &str) -> String {
        format!(
            "CHECK_RUNTIME_ERRORS(cudaMemcpyToSymbolAsync({}, &value, sizeof({}), (sizeof({}) * idx) + offsetof({}, {})));",
            array_name, ty, struct_name, struct_name, field
        )
    }

    fn launch(&self, kernel: &str, grid: (usize, usize), block_size: usize, args: &[KernelArg]) -> String {
        let args: Vec<&str> = args.iter().filter(|a| !a.merged_array).map(|a| a.name.as_str()).collect();
        [
            "{".to_string(),
            format!("const dim3 threads({}, 1);", block_size),
            format!("const dim3 grid({}, {});", grid.0, grid.1),
            format!("{}<<<grid, threads>>>({});", kernel, args.join(", ")),
            "CHECK_RUNTIME_ERRORS(cudaPeekAtLastError());".to_string(),
            "}".to_string(),
        ].join("\n")
    }

    fn wrap_device_source(&self, _name: &str, source: &str) -> String {
        source.to_string()
    }

    fn memory_functions(&self) -> String {
        [
            "EXPORT_FUNC void* allocateDeviceArray(size_t bytes) {",
            "    void* ptr = nullptr;",
            "    CHECK_RUNTIME_ERRORS(cudaMalloc(&ptr, bytes));",
            "    return ptr;",
            "}",
            "",
            "EXPORT_FUNC void freeDeviceArray(void* ptr) {",
            "    CHECK_RUNTIME_ERRORS(cudaFree(ptr));",
            "}",
            "",
            "EXPORT_FUNC void pushDeviceArray(void* devicePtr, const void* hostPtr, size_t bytes) {",
            "    CHECK_RUNTIME_ERRORS(cudaMemcpy(devicePtr, hostPtr, bytes, cudaMemcpyHostToDevice));",
            "}",
            "",
            "EXPORT_FUNC void pullDeviceArray(const void* devicePtr, void* hostPtr, size_t bytes) {",
            "    CHECK_RUNTIME_ERRORS(cudaMemcpy(hostPtr, devicePtr, bytes, cudaMemcpyDeviceToHost));",
            "}",
        ].join("\n")
    }

    fn runner_globals(&self, _modules: &[String]) -> String {
        String::new()
    }

    fn device_setup(&self, _modules: &[String]) -> String {
        "CHECK_RUNTIME_ERRORS(cudaSetDevice(0));".to_string()
    }

    fn synchronise(&self) -> &'static str {
        "CHECK_RUNTIME_ERRORS(cudaDeviceSynchronize());"
    }

    fn rng_functions(&self, context: &TypeContext) -> Vec<(&'static str, ResolvedType, String)> {
        let single = context.scalar.same_unqualified(&ResolvedType::float());
        let suffix = if single { "" } else { "_double" };
        vec![
            ("gennrand_uniform", ResolvedType::function(context.scalar.clone(), vec![]), format!("curand_uniform{}(&localRNG)", suffix)),
            ("gennrand_normal", ResolvedType::function(context.scalar.clone(), vec![]), format!("curand_normal{}(&localRNG)", suffix)),
            (
                "gennrand_exponential",
                ResolvedType::function(context.scalar.clone(), vec![]),
                format!("(-log(curand_uniform{}(&localRNG)))", suffix),
            ),
        ]
    }

    fn rng_init(&self, seed: u64, sequence: &str, offset: &str) -> String {
        format!(
            "curandStatePhilox4_32_10_t localRNG;\ncurand_init({}ull, {}, {}, &localRNG);",
            seed, sequence, offset
        )
    }
}

/// OpenCL 2.0 with shared virtual memory for merged group arrays
#[cfg(feature = "opencl")]
#[derive(Debug, Clone, Default)]
pub struct OpenClPlatform;

#[cfg(feature = "opencl")]
impl OpenClPlatform {
    fn atomic_type_suffix(ty: &ResolvedType) -> &'static str {
        if ty.same_unqualified(&ResolvedType::float()) {
            "_f"
        } else if ty.same_unqualified(&ResolvedType::double()) {
            "_d"
        } else {
            ""
        }
    }
}

#[cfg(feature = "opencl")]
impl SimtPlatform for OpenClPlatform {
    fn name(&self) -> &'static str {
        "OpenCL"
    }

    fn device_preamble(&self) -> String {
        [
            "#pragma OPENCL EXTENSION cl_khr_int64_base_atomics : enable",
            "#include <clRNG/philox432.clh>",
            "",
            "typedef unsigned char uint8_t;",
            "typedef unsigned short uint16_t;",
            "typedef unsigned int uint32_t;",
            "typedef char int8_t;",
            "typedef short int16_t;",
            "typedef int int32_t;",
            "",
            "inline void atomic_add_f_global(volatile __global float *source, const float operand) {",
            "    union { unsigned int intVal; float floatVal; } newVal;",
            "    union { unsigned int intVal; float floatVal; } prevVal;",
            "    do {",
            "        prevVal.floatVal = *source;",
            "        newVal.floatVal = prevVal.floatVal + operand;",
            "    } while(atomic_cmpxchg((volatile __global unsigned int *)source, prevVal.intVal, newVal.intVal) != prevVal.intVal);",
            "}",
        ].join("\n")
    }

    fn runner_preamble(&self) -> String {
        [
            "#include \"definitions.h\"",
            "#include <cstdio>",
            "#include <cstdlib>",
            "#define CL_HPP_TARGET_OPENCL_VERSION 200",
            "#include <CL/opencl.hpp>",
            "",
            "#define CHECK_OPENCL_ERRORS(call) {\\",
            "    cl_int error = call;\\",
            "    if(error != CL_SUCCESS) {\\",
            "        fprintf(stderr, \"%s: %i: opencl error %i\\n\", __FILE__, __LINE__, (int)error);\\",
            "        exit(EXIT_FAILURE);\\",
            "    }\\",
            "}",
            "",
            "extern cl::Context clContext;",
            "extern cl::CommandQueue commandQueue;",
            "extern cl::Device clDevice;",
        ].join("\n")
    }

    fn kernel_declaration(&self, name: &str, args: &[KernelArg]) -> String {
        let args: Vec<String> = args.iter()
            .map(|a| if a.merged_array {
                format!("__global struct {} *{}", a.ty, a.name)
            } else {
                format!("{} {}", a.ty, a.name)
            })
            .collect();

        format!("__kernel void {}({})", name, args.join(", "))
    }

    fn thread_id(&self) -> &'static str {
        "get_local_id(0)"
    }

    fn block_id(&self, axis: usize) -> String {
        format!("get_group_id({})", axis)
    }

    fn shared_prefix(&self) -> &'static str {
        "__local "
    }

    fn pointer_prefix(&self) -> &'static str {
        "__global "
    }

    fn barrier(&self) -> &'static str {
        "barrier(CLK_LOCAL_MEM_FENCE)"
    }

    fn atomic(&self, operation: AtomicOperation, ty: &ResolvedType, memory: MemorySpace) -> String {
        let memory = match memory {
            MemorySpace::Global => "global",
            MemorySpace::Shared => "local",
        };
        let suffix = Self::atomic_type_suffix(ty);
        if suffix.is_empty() {
            format!("atomic_{}", atomic_name(operation).to_lowercase())
        } else {
            format!("atomic_{}{}_{}", atomic_name(operation).to_lowercase(), suffix, memory)
        }
    }

    fn clz(&self) -> &'static str {
        "clz"
    }

    fn warp_reduce(&self, operation: ReductionOperation, value: &str, _type_name: &str) -> String {
        let function = match operation {
            ReductionOperation::Sum => "sub_group_reduce_add",
            ReductionOperation::Max => "sub_group_reduce_max",
        };

        format!("{} = {}({});", value, function, value)
    }

    fn merged_group_array(&self, struct_name: &str, array_name: &str, _count: usize) -> (String, String) {
        (String::new(), format!("{} *{} = nullptr;", struct_name, array_name))
    }

    fn merged_group_allocation(&self, struct_name: &str, array_name: &str, count: usize) -> Option<String> {
        Some(format!(
            "{} = ({} *)clSVMAlloc(clContext(), CL_MEM_READ_WRITE | CL_MEM_SVM_FINE_GRAIN_BUFFER, sizeof({}) * {}, 0);",
            array_name, struct_name, struct_name, count
        ))
    }

    fn host_structs_required(&self) -> bool {
        true
    }

    fn module_setup(&self, module: &str, kernels: &[String]) -> String {
        let mut lines = vec![format!("cl::Program {}Program;", module)];
        lines.extend(kernels.iter().map(|k| format!("cl::Kernel {}Kernel;", k)));
        lines.push(String::new());
        lines.push(format!("EXPORT_FUNC void build{}Program() {{", crate::utils::upper_first(module)));
        lines.push(format!("{}Program = cl::Program(clContext, {}Src, false);", module, module));
        lines.push(format!("CHECK_OPENCL_ERRORS({}Program.build(\"-cl-std=CL2.0\"));", module));
        for kernel in kernels {
            lines.push(format!("{}Kernel = cl::Kernel({}Program, \"{}\");", kernel, module, kernel));
        }
        lines.push("}".to_string());

        lines.join("\n")
    }

    fn start_id_table(&self, name: &str, start_ids: &[usize]) -> String {
        let ids: Vec<String> = start_ids.iter().map(|i| i.to_string()).collect();
        format!("__constant unsigned int {}[] = {{{}}};", name, ids.join(", "))
    }

    fn push_field(&self, _struct_name: &str, array_name: &str, field: &str, _ty: &str) -> String {
        format!("{}[idx].{} = value;", array_name, field)
    }

    fn launch(&self, kernel: &str, grid: (usize, usize), block_size: usize, args: &[KernelArg]) -> String {
        let mut lines = vec!["{".to_string()];
        for (i, arg) in args.iter().enumerate() {
            lines.push(format!("CHECK_OPENCL_ERRORS({}Kernel.setArg({}, {}));", kernel, i, arg.name));
        }
        lines.push(format!("const cl::NDRange globalWorkSize({}, {});", grid.0 * block_size, grid.1));
        lines.push(format!("const cl::NDRange localWorkSize({}, 1);", block_size));
        lines.push(format!(
            "CHECK_OPENCL_ERRORS(commandQueue.enqueueNDRangeKernel({}Kernel, cl::NullRange, globalWorkSize, localWorkSize));",
            kernel
        ));
        lines.push("}".to_string());

        lines.join("\n")
    }

    fn wrap_device_source(&self, name: &str, source: &str) -> String {
        format!("static const char* {}Src = R\"(\n{}\n)\";", name, source)
    }

    fn memory_functions(&self) -> String {
        [
            "EXPORT_FUNC void* allocateDeviceArray(size_t bytes) {",
            "    return clSVMAlloc(clContext(), CL_MEM_READ_WRITE | CL_MEM_SVM_FINE_GRAIN_BUFFER, bytes, 0);",
            "}",
            "",
            "EXPORT_FUNC void freeDeviceArray(void* ptr) {",
            "    clSVMFree(clContext(), ptr);",
            "}",
            "",
            "EXPORT_FUNC void pushDeviceArray(void* devicePtr, const void* hostPtr, size_t bytes) {",
            "    CHECK_OPENCL_ERRORS(clEnqueueSVMMemcpy(commandQueue(), CL_TRUE, devicePtr, hostPtr, bytes, 0, nullptr, nullptr));",
            "}",
            "",
            "EXPORT_FUNC void pullDeviceArray(const void* devicePtr, void* hostPtr, size_t bytes) {",
            "    CHECK_OPENCL_ERRORS(clEnqueueSVMMemcpy(commandQueue(), CL_TRUE, hostPtr, devicePtr, bytes, 0, nullptr, nullptr));",
            "}",
        ].join("\n")
    }

    fn runner_globals(&self, modules: &[String]) -> String {
        let mut lines = vec![
            "cl::Context clContext;".to_string(),
            "cl::CommandQueue commandQueue;".to_string(),
            "cl::Device clDevice;".to_string(),
            String::new(),
        ];
        lines.extend(modules.iter().map(|m| format!("EXPORT_FUNC void build{}Program();", crate::utils::upper_first(m))));

        lines.join("\n")
    }

    fn device_setup(&self, modules: &[String]) -> String {
        let mut lines = vec![
            "std::vector<cl::Platform> platforms;".to_string(),
            "CHECK_OPENCL_ERRORS(cl::Platform::get(&platforms));".to_string(),
            "std::vector<cl::Device> devices;".to_string(),
            "CHECK_OPENCL_ERRORS(platforms[0].getDevices(CL_DEVICE_TYPE_ALL, &devices));".to_string(),
            "clDevice = devices[0];".to_string(),
            "clContext = cl::Context(clDevice);".to_string(),
            "commandQueue = cl::CommandQueue(clContext, clDevice);".to_string(),
        ];
        lines.extend(modules.iter().map(|m| format!("build{}Program();", crate::utils::upper_first(m))));

        lines.join("\n")
    }

    fn synchronise(&self) -> &'static str {
        "CHECK_OPENCL_ERRORS(commandQueue.finish());"
    }

    fn rng_functions(&self, context: &TypeContext) -> Vec<(&'static str, ResolvedType, String)> {
        vec![
            ("gennrand_uniform", ResolvedType::function(context.scalar.clone(), vec![]), "clrngPhilox432RandomU01(&localRNG)".to_string()),
            ("gennrand_normal", ResolvedType::function(context.scalar.clone(), vec![]), "normalDist(&localRNG)".to_string()),
            ("gennrand_exponential", ResolvedType::function(context.scalar.clone(), vec![]), "exponentialDist(&localRNG)".to_string()),
        ]
    }

    fn rng_init(&self, seed: u64, sequence: &str, offset: &str) -> String {
        format!(
            "clrngPhilox432Stream localRNG;\nclrngPhilox432InitStream(&localRNG, {}ul, {}, {});",
            seed, sequence, offset
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::types::ResolvedType;
    use super::{AtomicOperation, CudaPlatform, MemorySpace, SimtPlatform};

    #[test]
    fn test_cuda_atomic_names() {
        let cuda = CudaPlatform;

        assert_eq!(cuda.atomic(AtomicOperation::Add, &ResolvedType::float(), MemorySpace::Global), "atomicAdd");
        assert_eq!(cuda.atomic(AtomicOperation::Or, &ResolvedType::uint32(), MemorySpace::Shared), "atomicOr");
    }

    #[cfg(feature = "opencl")]
    #[test]
    fn test_opencl_atomic_names() {
        let opencl = super::OpenClPlatform;

        assert_eq!(opencl.atomic(AtomicOperation::Add, &ResolvedType::float(), MemorySpace::Global), "atomic_add_f_global");
        assert_eq!(opencl.atomic(AtomicOperation::Or, &ResolvedType::uint32(), MemorySpace::Shared), "atomic_or");
    }
}
