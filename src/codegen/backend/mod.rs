//! SIMT backend shared by every platform. Kernels are laid out so each merged
//! group owns a block aligned range of thread ids, within which each member
//! owns a padded sub-range.

pub mod platform;
pub mod presynaptic;
pub(crate) mod neuron_update;
pub(crate) mod synapse_update;
pub(crate) mod init;
pub(crate) mod custom_update;

use crate::config::{Platform, Preferences};
use crate::error::{ConfigurationError, SpikeCodegenError};
use crate::groups::{CustomUpdate, CustomUpdateWU, MatrixConnectivity, ModelSpec, NeuronGroup, SynapseGroup};
use crate::merged::{ChildKind, MergedGroup, MergedKind};
use crate::models::{EGP, Var};
use crate::types::{parse_type, ResolvedType, TypeContext};
use crate::utils::{ceil_divide, pad_size, upper_first};
use super::code_stream::CodeStream;
use super::environment::Environment;
use platform::{CudaPlatform, KernelArg, SimtPlatform};
use presynaptic::StrategyRegistry;

#[cfg(feature = "opencl")]
use platform::OpenClPlatform;


pub type CodegenResult<T> = Result<T, SpikeCodegenError>;

/// Kernels the backend generates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    NeuronUpdate,
    PresynapticUpdate,
    PostsynapticUpdate,
    SynapseDynamicsUpdate,
    Initialize,
    InitializeSparse,
    NeuronSpikeQueueUpdate,
    NeuronPrevSpikeTimeUpdate,
    SynapseDendriticDelayUpdate,
    CustomUpdate,
    CustomTransposeUpdate,
}

impl Kernel {
    /// Name of the kernel, custom update kernels are suffixed with their update group
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::NeuronUpdate => "updateNeuronsKernel",
            Kernel::PresynapticUpdate => "updatePresynapticKernel",
            Kernel::PostsynapticUpdate => "updatePostsynapticKernel",
            Kernel::SynapseDynamicsUpdate => "updateSynapseDynamicsKernel",
            Kernel::Initialize => "initializeKernel",
            Kernel::InitializeSparse => "initializeSparseKernel",
            Kernel::NeuronSpikeQueueUpdate => "neuronSpikeQueueUpdateKernel",
            Kernel::NeuronPrevSpikeTimeUpdate => "neuronPrevSpikeTimeUpdateKernel",
            Kernel::SynapseDendriticDelayUpdate => "synapseDendriticDelayUpdateKernel",
            Kernel::CustomUpdate => "customUpdate",
            Kernel::CustomTransposeUpdate => "customTransposeUpdate",
        }
    }
}

/// Thread ids owned by one merged group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRange {
    pub kind: MergedKind,
    pub merged_index: usize,
    /// First thread id of each member
    pub start_ids: Vec<usize>,
    /// One past the last thread id of the final member
    pub end: usize,
}

impl GroupRange {
    pub fn start(&self) -> usize {
        self.start_ids.first().copied().unwrap_or(self.end)
    }

    /// Padded number of threads owned by each member
    pub fn member_sizes(&self) -> Vec<usize> {
        self.start_ids.iter().enumerate()
            .map(|(i, &start)| self.start_ids.get(i + 1).copied().unwrap_or(self.end) - start)
            .collect()
    }
}

/// Thread ranges of every merged group launched by one kernel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelLayout {
    pub ranges: Vec<GroupRange>,
    /// Total threads, the launch size of the kernel
    pub num_threads: usize,
}

impl KernelLayout {
    /// Continues the layout with further merged groups, padding each member to `block_size`
    pub fn append<'g, 'a: 'g, G: 'a>(
        &mut self,
        groups: &[&'g MergedGroup<'a, G>],
        block_size: usize,
        mut num_threads: impl FnMut(&G) -> CodegenResult<usize>,
    ) -> CodegenResult<()> {
        for merged in groups {
            let mut start_ids = Vec::with_capacity(merged.groups.len());
            for group in &merged.groups {
                start_ids.push(self.num_threads);
                self.num_threads += pad_size(num_threads(group)?, block_size);
            }
            self.ranges.push(GroupRange {
                kind: merged.kind,
                merged_index: merged.index,
                start_ids,
                end: self.num_threads,
            });
        }

        Ok(())
    }

    pub fn range(&self, kind: MergedKind, merged_index: usize) -> Option<&GroupRange> {
        self.ranges.iter().find(|r| r.kind == kind && r.merged_index == merged_index)
    }

    pub fn num_blocks(&self, block_size: usize) -> usize {
        ceil_divide(self.num_threads, block_size)
    }
}

/// Device and host code of one generated source file, assembled by [`Backend::finish_module`]
#[derive(Debug, Default)]
pub(crate) struct ModuleSource {
    pub device: CodeStream,
    pub host: CodeStream,
    /// Host statements run by the module's merged group allocation function
    pub allocations: Vec<String>,
    pub kernels: Vec<String>,
}

impl ModuleSource {
    pub fn add_merged_group<G>(&mut self, backend: &Backend, merged: &MergedGroup<'_, G>) {
        backend.gen_merged_group(&mut self.device, &mut self.host, &mut self.allocations, merged);
    }
}

/// Generates kernels and host code for one SIMT platform
#[derive(Debug)]
pub struct Backend {
    platform: Box<dyn SimtPlatform>,
    preferences: Preferences,
    strategies: StrategyRegistry,
}

impl Backend {
    pub fn new(preferences: Preferences) -> Result<Self, ConfigurationError> {
        let platform: Box<dyn SimtPlatform> = match preferences.platform {
            Platform::Cuda => Box::new(CudaPlatform),
            #[cfg(feature = "opencl")]
            Platform::OpenCL => Box::new(OpenClPlatform),
            #[cfg(not(feature = "opencl"))]
            Platform::OpenCL => {
                return Err(ConfigurationError::Unsupported("OpenCL support was not enabled at build time".to_string()));
            },
        };

        Ok(Self::with_platform(platform, preferences))
    }

    pub fn with_platform(platform: Box<dyn SimtPlatform>, preferences: Preferences) -> Self {
        Backend { platform, preferences, strategies: StrategyRegistry::default() }
    }

    pub fn platform(&self) -> &dyn SimtPlatform {
        self.platform.as_ref()
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    pub fn strategies_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.strategies
    }

    pub fn block_size(&self, kernel: Kernel) -> usize {
        let sizes = &self.preferences.block_sizes;
        match kernel {
            Kernel::NeuronUpdate => sizes.neuron_update,
            Kernel::PresynapticUpdate => sizes.presynaptic_update,
            Kernel::PostsynapticUpdate => sizes.postsynaptic_update,
            Kernel::SynapseDynamicsUpdate => sizes.synapse_dynamics_update,
            Kernel::Initialize => sizes.initialize,
            Kernel::InitializeSparse => sizes.initialize_sparse,
            Kernel::NeuronSpikeQueueUpdate => sizes.neuron_spike_queue_update,
            Kernel::NeuronPrevSpikeTimeUpdate => sizes.neuron_prev_spike_time_update,
            Kernel::SynapseDendriticDelayUpdate => sizes.synapse_dendritic_delay_update,
            Kernel::CustomUpdate => sizes.custom_update,
            Kernel::CustomTransposeUpdate => sizes.custom_transpose_update,
        }
    }

    pub fn num_neuron_update_threads(&self, ng: &NeuronGroup) -> usize {
        pad_size(ng.num_neurons, self.block_size(Kernel::NeuronUpdate))
    }

    pub fn num_presynaptic_update_threads(&self, sg: &SynapseGroup) -> Result<usize, ConfigurationError> {
        Ok(self.strategies.select(sg, &self.preferences)?.num_threads(sg))
    }

    pub fn num_postsynaptic_update_threads(&self, sg: &SynapseGroup) -> usize {
        if sg.is_sparse() {
            sg.col_stride()
        } else {
            sg.num_src_neurons
        }
    }

    pub fn num_synapse_dynamics_threads(&self, sg: &SynapseGroup) -> usize {
        if sg.is_sparse() {
            sg.num_src_neurons * sg.row_stride()
        } else {
            sg.num_src_neurons * sg.num_trg_neurons
        }
    }

    /// One thread per row with row building code, otherwise one per column
    pub fn num_connectivity_init_threads(&self, sg: &SynapseGroup) -> Result<usize, ConfigurationError> {
        let snippet = sg.connectivity_initialiser.as_ref().map(|c| &c.snippet);
        match snippet {
            Some(snippet) if !snippet.row_build_code.is_empty() => Ok(sg.num_src_neurons),
            Some(snippet) if !snippet.col_build_code.is_empty() => Ok(sg.num_trg_neurons),
            _ => Err(ConfigurationError::MissingConnectivityCode),
        }
    }

    pub fn num_custom_update_threads(&self, cu: &CustomUpdate, batch_size: usize) -> usize {
        let block_size = self.block_size(Kernel::CustomUpdate);
        let copies = cu.num_copies(batch_size);
        if cu.is_neuron_reduction() {
            pad_size(32 * copies, block_size)
        } else if cu.is_per_element() {
            copies * pad_size(cu.size, block_size)
        } else {
            pad_size(copies, block_size)
        }
    }

    pub fn num_custom_wu_update_threads(&self, cu: &CustomUpdateWU, sg: &SynapseGroup, batch_size: usize) -> usize {
        let block_size = self.block_size(Kernel::CustomUpdate);
        let copies = cu.num_copies(batch_size);
        if sg.has_kernel_weights() {
            copies * pad_size(sg.flattened_kernel_size(), block_size)
        } else {
            copies * pad_size(sg.num_src_neurons * sg.row_stride(), block_size)
        }
    }

    pub fn num_custom_transpose_update_threads(&self, cu: &CustomUpdateWU, sg: &SynapseGroup, batch_size: usize) -> usize {
        let block_size = self.block_size(Kernel::CustomTransposeUpdate);
        let copies = cu.num_copies(batch_size);
        copies * pad_size(sg.num_src_neurons, block_size) * pad_size(sg.num_trg_neurons, block_size) / block_size
    }

    /// Dense weights loop over rows with one thread per column, kernel weights have one thread per entry
    pub fn num_synapse_init_threads(&self, sg: &SynapseGroup) -> usize {
        if sg.has_kernel_weights() {
            sg.flattened_kernel_size()
        } else {
            sg.num_trg_neurons
        }
    }

    /// Sparse initialisation loops over rows with one thread per row entry
    pub fn num_sparse_init_threads(&self, sg: &SynapseGroup) -> usize {
        sg.row_stride()
    }

    pub fn num_custom_wu_init_threads(&self, sg: &SynapseGroup) -> usize {
        if sg.has_kernel_weights() {
            sg.flattened_kernel_size()
        } else if sg.is_sparse() {
            sg.row_stride()
        } else {
            sg.num_trg_neurons
        }
    }

    /// Declares thread and batch ids at the top of a kernel
    pub(crate) fn gen_kernel_ids(&self, os: &mut CodeStream, kernel: Kernel, batched: bool) {
        let block_size = self.block_size(kernel);
        os.line(&format!(
            "const unsigned int id = {} * {} + {};",
            block_size, self.platform.block_id(0), self.platform.thread_id()
        ));
        if batched {
            os.line(&format!("const unsigned int batch = {};", self.platform.block_id(1)));
        }
    }

    /// Emits the kernel header with its merged group arrays as arguments where the platform needs them
    pub(crate) fn gen_kernel_header(&self, os: &mut CodeStream, name: &str, args: &[KernelArg]) {
        os.line(&format!("{} {{", self.platform.kernel_declaration(name, args)));
    }

    pub(crate) fn merged_array_args<'g, 'a: 'g, G: 'a>(&self, groups: &[&'g MergedGroup<'a, G>]) -> Vec<KernelArg> {
        groups.iter()
            .map(|m| KernelArg::merged_array(&m.struct_name(), &merged_array_name(m)))
            .collect()
    }

    /// Start id tables for merged groups with more than one member
    pub(crate) fn gen_start_id_tables(&self, os: &mut CodeStream, layout: &KernelLayout) {
        for range in layout.ranges.iter().filter(|r| r.start_ids.len() > 1) {
            os.line(&self.platform.start_id_table(&start_id_table_name(range), &range.start_ids));
        }
    }

    /// Emits the bounds check, member lookup and `lid` of every merged group then calls `body`
    pub(crate) fn gen_parallel_groups<'g, 'a: 'g, G: 'a>(
        &self,
        os: &mut CodeStream,
        groups: &[&'g MergedGroup<'a, G>],
        layout: &KernelLayout,
        mut body: impl FnMut(&mut CodeStream, &'g MergedGroup<'a, G>) -> CodegenResult<()>,
    ) -> CodegenResult<()> {
        for merged in groups {
            let Some(range) = layout.range(merged.kind, merged.index) else { continue };
            let struct_name = merged.struct_name();
            let array_name = merged_array_name(merged);
            let prefix = self.platform.pointer_prefix();

            os.line(&format!("// {}", struct_name));
            os.line(&format!("if(id >= {} && id < {}) {{", range.start(), range.end));
            if range.start_ids.len() == 1 {
                os.line(&format!("{}struct {} *group = &{}[0];", prefix, struct_name, array_name));
                os.line(&format!("const unsigned int lid = id - {};", range.start()));
            } else {
                let table = start_id_table_name(range);
                os.line("unsigned int lo = 0;");
                os.line(&format!("unsigned int hi = {};", range.start_ids.len()));
                os.line("while(lo < hi) {");
                os.line("const unsigned int mid = (lo + hi) / 2;");
                os.line(&format!("if(id < {}[mid]) {{", table));
                os.line("hi = mid;");
                os.line("}");
                os.line("else {");
                os.line("lo = mid + 1;");
                os.line("}");
                os.line("}");
                os.line(&format!("{}struct {} *group = &{}[lo - 1];", prefix, struct_name, array_name));
                os.line(&format!("const unsigned int lid = id - {}[lo - 1];", table));
            }
            body(os, merged)?;
            os.line("}");
        }

        Ok(())
    }

    /// Emits code which runs once per member, one thread each
    pub(crate) fn gen_group_per_thread<'g, 'a: 'g, G: 'a>(
        &self,
        os: &mut CodeStream,
        groups: &[&'g MergedGroup<'a, G>],
        mut body: impl FnMut(&mut CodeStream, &'g MergedGroup<'a, G>) -> CodegenResult<()>,
    ) -> CodegenResult<usize> {
        let mut start = 0;
        for merged in groups {
            let end = start + merged.groups.len();
            os.line(&format!("// {}", merged.struct_name()));
            os.line(&format!("if(id >= {} && id < {}) {{", start, end));
            os.line(&format!(
                "{}struct {} *group = &{}[id - {}];",
                self.platform.pointer_prefix(), merged.struct_name(), merged_array_name(merged), start
            ));
            body(os, merged)?;
            os.line("}");
            start = end;
        }

        Ok(start)
    }

    /// Struct holding the fields of one member of a merged group
    pub(crate) fn gen_merged_struct<G>(&self, os: &mut CodeStream, merged: &MergedGroup<'_, G>, device: bool) {
        os.line(&format!("struct {} {{", merged.struct_name()));
        for field in &merged.fields {
            let prefix = if device && field.ty.is_pointer() { self.platform.pointer_prefix() } else { "" };
            os.line(&format!("{}{} {};", prefix, field.ty.get_name(), field.name));
        }
        os.line("};");
    }

    /// Declares the struct and merged group array, along with host functions
    /// which push each field of one member to the device
    pub(crate) fn gen_merged_group<G>(
        &self,
        device: &mut CodeStream,
        host: &mut CodeStream,
        allocations: &mut Vec<String>,
        merged: &MergedGroup<'_, G>,
    ) {
        let struct_name = merged.struct_name();
        let array_name = merged_array_name(merged);

        self.gen_merged_struct(device, merged, true);
        if self.platform.host_structs_required() {
            self.gen_merged_struct(host, merged, false);
        }

        let (device_array, host_array) = self.platform.merged_group_array(&struct_name, &array_name, merged.groups.len());
        if !device_array.is_empty() {
            device.line(&device_array);
        }
        if !host_array.is_empty() {
            host.line(&host_array);
        }
        if let Some(allocation) = self.platform.merged_group_allocation(&struct_name, &array_name, merged.groups.len()) {
            allocations.push(allocation);
        }
        device.blank();

        for field in &merged.fields {
            let ty = field.ty.get_name();
            host.line(&format!(
                "EXPORT_FUNC void {}(unsigned int idx, {} value) {{",
                merged.push_function_name(&field.name), ty
            ));
            host.line(&self.platform.push_field(&struct_name, &array_name, &field.name, &ty));
            host.line("}");
        }
        host.blank();
    }

    /// Host function launching a kernel, or nothing if it has no threads
    pub(crate) fn gen_launch(&self, os: &mut CodeStream, kernel: Kernel, name: &str, num_threads: usize, batches: usize, args: &[KernelArg]) {
        if num_threads == 0 {
            return;
        }
        let block_size = self.block_size(kernel);
        os.line(&self.platform.launch(name, (ceil_divide(num_threads, block_size), batches), block_size, args));
    }

    /// Environment with the names available to all model code
    pub(crate) fn base_environment(&self, context: &TypeContext) -> Environment<'static> {
        let mut env = Environment::new(context);
        env.add_math_functions();
        env.add("dt", context.scalar.add_const(), "DT");
        env
    }

    /// Adds random number functions which seed a per-thread generator on first use
    pub(crate) fn add_rng(&self, env: &mut Environment<'_>, seed: u64, sequence: &str) {
        let init = self.platform.rng_init(seed, sequence, "0");
        env.add_lazy(RNG_ENTRY, ResolvedType::void(), "localRNG", init, None);
        let context = env.context().clone();
        for (name, ty, template) in self.platform.rng_functions(&context) {
            env.add_full(name, ty, &template, None, None, vec![RNG_ENTRY.to_string()]);
        }
    }

    /// Adds random number functions drawing from a generator declared by an enclosing scope
    pub(crate) fn add_shared_rng(&self, env: &mut Environment<'_>) {
        let context = env.context().clone();
        for (name, ty, template) in self.platform.rng_functions(&context) {
            env.add(name, ty, &template);
        }
    }

    pub(crate) fn atomic_add(&self, ty: &ResolvedType, memory: platform::MemorySpace) -> String {
        self.platform.atomic(platform::AtomicOperation::Add, ty, memory)
    }

    /// Assembles a module: device code wrapped for the platform followed by its host functions
    pub(crate) fn finish_module(&self, model: &ModelSpec, name: &str, module: ModuleSource) -> String {
        let scalar = model.type_context().scalar;
        let time_max = if scalar.same_unqualified(&ResolvedType::float()) { "FLT_MAX" } else { "DBL_MAX" };
        let device = [
            self.platform.device_preamble(),
            String::new(),
            "#ifndef DT".to_string(),
            format!("#define DT {}", scalar.write_numeric(model.dt)),
            "#endif".to_string(),
            "#ifndef TIME_MAX".to_string(),
            format!("#define TIME_MAX {}", time_max),
            "#endif".to_string(),
            String::new(),
            module.device.into_string(),
        ].join("\n");

        let mut os = CodeStream::new();
        os.line(&self.platform.runner_preamble());
        os.blank();
        os.line(&self.platform.wrap_device_source(name, &device));
        os.blank();

        let setup = self.platform.module_setup(name, &module.kernels);
        if !setup.is_empty() {
            os.line(&setup);
            os.blank();
        }
        os.line(module.host.as_str());
        os.line(&format!("EXPORT_FUNC void allocate{}MergedGroups() {{", upper_first(name)));
        for allocation in &module.allocations {
            os.line(allocation);
        }
        os.line("}");

        os.into_string()
    }
}

/// Index of one element of a population's variable
pub(crate) fn element_index(duplicated: bool, shared_neuron: bool, batch_offset: &str, id: &str) -> String {
    match (shared_neuron, duplicated) {
        (true, true) => "batch".to_string(),
        (true, false) => "0".to_string(),
        (false, true) => format!("{} + {}", batch_offset, id),
        (false, false) => id.to_string(),
    }
}

/// Children of the archetype of a merged group
pub(crate) fn archetype_children<G>(merged: &MergedGroup<'_, G>, kind: ChildKind) -> Vec<usize> {
    merged.children(kind).and_then(|c| c.first().cloned()).unwrap_or_default()
}

/// Generator sequence unique to each thread, batch and time step
pub(crate) fn step_rng_sequence(batch_size: usize, num_threads: usize) -> String {
    format!("((((unsigned long long)round(t / DT) * {}) + batch) * {}) + id", batch_size, num_threads)
}

/// Name of the lazily seeded generator entry, random functions depend on it
pub(crate) const RNG_ENTRY: &str = "_rng";

pub(crate) fn merged_array_name<G>(merged: &MergedGroup<'_, G>) -> String {
    format!("d_merged{}Group{}", merged.kind.name(), merged.index)
}

fn start_id_table_name(range: &GroupRange) -> String {
    format!("d_merged{}GroupStartID{}", range.kind.name(), range.merged_index)
}

/// Adds parameters, each either a field or a literal
pub(crate) fn add_params<G>(
    env: &mut Environment<'_>,
    merged: &MergedGroup<'_, G>,
    names: &[String],
    suffix: &str,
    scalar: &ResolvedType,
    value: impl Fn(&str) -> f64,
) {
    for name in names {
        let field_name = format!("{}{}", name, suffix);
        if merged.has_field(&field_name) {
            env.add(name, scalar.add_const(), &format!("group->{}", field_name));
        } else {
            env.add(name, scalar.add_const(), &scalar.write_numeric(value(name)));
        }
    }
}

pub(crate) fn add_egps(env: &mut Environment<'_>, egps: &[EGP], suffix: &str) {
    let context = env.context().clone();
    for egp in egps {
        let ty = parse_type(&egp.ty, &context).unwrap_or_else(|| context.scalar.create_pointer());
        env.add(&egp.name, ty, &format!("group->{}{}", egp.name, suffix));
    }
}

/// Adds variables cached in locals, read before the code and written back after it unless read only
pub(crate) fn add_cached_vars(
    env: &mut Environment<'_>,
    vars: &[Var],
    suffix: &str,
    index: impl Fn(&Var) -> String,
) {
    let context = env.context().clone();
    for var in vars {
        let ty = crate::merged::var_type(var, &context);
        let local = format!("_l{}{}", var.name, suffix);
        let array = format!("group->{}{}[{}]", var.name, suffix, index(var));
        let initialiser = format!("{} {} = {};", ty.get_name(), local, array);
        if var.access.is_read_only() {
            env.add_lazy(&var.name, ty.add_const(), &local, initialiser, None);
        } else {
            env.add_lazy(&var.name, ty, &local, initialiser, Some(format!("{} = {};", array, local)));
        }
    }
}

/// Names of every parameter and derived parameter of a snippet
pub(crate) fn param_names(snippet: &crate::models::SnippetBase) -> Vec<String> {
    snippet.params.iter().cloned()
        .chain(snippet.derived_params.iter().map(|d| d.name.clone()))
        .collect()
}

/// Is connectivity stored in arrays rather than generated procedurally
pub(crate) fn has_stored_connectivity(sg: &SynapseGroup) -> bool {
    matches!(sg.matrix_type.connectivity, MatrixConnectivity::Dense | MatrixConnectivity::Sparse | MatrixConnectivity::Bitmask)
}

/// Wraps generated code in a block with its environment's pre and postamble
pub(crate) fn wrap_code(preamble: &str, code: &str, postamble: &str) -> String {
    format!("{}{}{}", preamble, code, postamble)
}


#[cfg(test)]
mod tests {
    use crate::config::Preferences;
    use crate::models::{neuron_models, param_values, VarInit};
    use crate::groups::ModelSpec;
    use crate::merged::ModelMerged;
    use super::{Backend, Kernel, KernelLayout};

    fn lif_model(sizes: &[usize]) -> ModelSpec {
        let mut model = ModelSpec::new("layout");
        let params = param_values(&[
            ("C", 1.0), ("TauM", 20.0), ("Vrest", -70.0), ("Vreset", -70.0),
            ("Vthresh", -51.0), ("Ioffset", 0.0), ("TauRefrac", 2.0),
        ]);
        for (i, &size) in sizes.iter().enumerate() {
            let vars = [("V", VarInit::constant(-70.0)), ("RefracTime", VarInit::constant(0.0))]
                .into_iter().map(|(n, v)| (n.to_string(), v)).collect();
            model.add_neuron_population(&format!("Pop{}", i), size, neuron_models::lif(), params.clone(), vars).unwrap();
        }
        model.finalise().unwrap();
        model
    }

    #[test]
    fn test_members_get_padded_ranges() {
        let model = lif_model(&[10, 33, 64]);
        let merged = ModelMerged::new(&model).unwrap();
        let backend = Backend::new(Preferences::default()).unwrap();

        let groups: Vec<_> = merged.neuron_update_groups.iter().collect();
        let mut layout = KernelLayout::default();
        layout.append(&groups, backend.block_size(Kernel::NeuronUpdate), |ng| Ok(backend.num_neuron_update_threads(ng))).unwrap();

        assert_eq!(layout.ranges.len(), 1);
        assert_eq!(layout.ranges[0].start_ids, vec![0, 32, 96]);
        assert_eq!(layout.ranges[0].member_sizes(), vec![32, 64, 64]);
        assert_eq!(layout.num_threads, 160);
        assert_eq!(layout.num_blocks(32), 5);
    }

    #[test]
    fn test_single_member_uses_direct_lookup() {
        let model = lif_model(&[100]);
        let merged = ModelMerged::new(&model).unwrap();
        let source = crate::codegen::generate_module_sources(&merged, &Backend::new(Preferences::default()).unwrap()).unwrap();
        let neuron_update = &source["neuronUpdate.cc"];

        assert!(neuron_update.contains("&d_mergedNeuronUpdateGroup0[0]"));
        assert!(!neuron_update.contains("d_mergedNeuronUpdateGroupStartID0"));
    }
}
