use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use rayon::prelude::*;
use crate::error::{RuntimeError, SpikeCodegenError};
use crate::merged::ModelMerged;
use crate::types::ResolvedType;
use crate::utils::{digest_to_hex, upper_first};
use super::backend::{custom_update, init, neuron_update, synapse_update, Backend, CodegenResult, ModuleSource};
use super::code_stream::CodeStream;


/// Names of the generated modules, each becomes `<name>.cc`
pub const MODULES: [&str; 4] = ["neuronUpdate", "synapseUpdate", "init", "customUpdate"];

fn gen_module(name: &str, backend: &Backend, merged: &ModelMerged<'_>) -> CodegenResult<ModuleSource> {
    match name {
        "neuronUpdate" => neuron_update::gen_neuron_update_module(backend, merged),
        "synapseUpdate" => synapse_update::gen_synapse_update_module(backend, merged),
        "init" => init::gen_init_module(backend, merged),
        _ => custom_update::gen_custom_update_module(backend, merged),
    }
}

fn gen_definitions(merged: &ModelMerged<'_>) -> String {
    let model = merged.model;
    let context = model.type_context();
    let time_type = context.timepoint.get_name();
    let time_max = if context.scalar.same_unqualified(&ResolvedType::float()) { "FLT_MAX" } else { "DBL_MAX" };

    let mut os = CodeStream::new();
    os.line("#pragma once");
    os.line(&format!("// {} {}", model.name, digest_to_hex(&merged.hash_digest())));
    os.blank();
    os.line("#ifdef _WIN32");
    os.line("#define EXPORT_FUNC extern \"C\" __declspec(dllexport)");
    os.line("#else");
    os.line("#define EXPORT_FUNC extern \"C\"");
    os.line("#endif");
    os.blank();
    os.line("#include <cstdint>");
    os.line("#include <cfloat>");
    os.line("#include <cmath>");
    os.blank();
    os.line(&format!("typedef {} scalar;", context.scalar.get_name()));
    os.line(&format!("#define DT {}", context.scalar.write_numeric(model.dt)));
    os.line(&format!("#define TIME_MAX {}", time_max));
    os.blank();
    os.line("EXPORT_FUNC void allocateMem();");
    os.line("EXPORT_FUNC void freeMem();");
    os.line("EXPORT_FUNC void initializeHost();");
    os.line("EXPORT_FUNC void stepTime(unsigned long long timestep, unsigned int numRecordingTimesteps);");
    os.line(&format!("EXPORT_FUNC void updateNeurons({} t, unsigned int recordingTimestep);", time_type));
    os.line(&format!("EXPORT_FUNC void updateNeuronQueues({} t);", time_type));
    os.line(&format!("EXPORT_FUNC void updateSynapses({} t);", time_type));
    os.line("EXPORT_FUNC void initialize();");
    os.line("EXPORT_FUNC void initializeSparse();");
    for name in merged.custom_update_group_names() {
        os.line(&format!("EXPORT_FUNC void update{}();", name));
    }
    for module in MODULES {
        os.line(&format!("EXPORT_FUNC void allocate{}MergedGroups();", upper_first(module)));
    }

    os.into_string()
}

fn gen_runner(merged: &ModelMerged<'_>, backend: &Backend) -> String {
    let platform = backend.platform();
    let time_type = merged.model.type_context().timepoint.get_name();
    let modules: Vec<String> = MODULES.iter().map(|m| m.to_string()).collect();

    let mut os = CodeStream::new();
    os.line(&platform.runner_preamble());
    os.blank();
    let globals = platform.runner_globals(&modules);
    if !globals.is_empty() {
        os.line(&globals);
        os.blank();
    }
    os.line(&platform.memory_functions());
    os.blank();

    os.line("EXPORT_FUNC void allocateMem() {");
    os.line(&platform.device_setup(&modules));
    for module in &modules {
        os.line(&format!("allocate{}MergedGroups();", upper_first(module)));
    }
    os.line("}");
    os.blank();

    os.line("EXPORT_FUNC void freeMem() {");
    os.line(platform.synchronise());
    os.line("}");
    os.blank();

    // Host side state is owned by the runtime, arrays arrive zeroed
    os.line("EXPORT_FUNC void initializeHost() {");
    os.line("}");
    os.blank();

    os.line("EXPORT_FUNC void stepTime(unsigned long long timestep, unsigned int numRecordingTimesteps) {");
    os.line(&format!("const {} t = timestep * DT;", time_type));
    os.line("const unsigned int recordingTimestep = (numRecordingTimesteps == 0) ? 0 : (unsigned int)(timestep % numRecordingTimesteps);");
    os.line("updateNeurons(t, recordingTimestep);");
    os.line("updateSynapses(t);");
    os.line("updateNeuronQueues(t);");
    os.line(platform.synchronise());
    os.line("}");

    os.into_string()
}

/// Generates every source file of a merged model, keyed by file name
pub fn generate_module_sources(merged: &ModelMerged<'_>, backend: &Backend) -> CodegenResult<BTreeMap<String, String>> {
    let modules = MODULES
        .par_iter()
        .map(|&name| {
            let module = gen_module(name, backend, merged)?;
            Ok((format!("{}.cc", name), backend.finish_module(merged.model, name, module)))
        })
        .collect::<CodegenResult<Vec<(String, String)>>>()?;

    let mut sources: BTreeMap<String, String> = modules.into_iter().collect();
    sources.insert("definitions.h".to_string(), gen_definitions(merged));
    sources.insert("runner.cc".to_string(), gen_runner(merged, backend));

    tracing::debug!("generated {} source files for {}", sources.len(), merged.model.name);

    Ok(sources)
}

/// Generates the sources of a merged model and writes them into `directory`
pub fn write_module_sources(
    merged: &ModelMerged<'_>,
    backend: &Backend,
    directory: &Path,
) -> Result<Vec<String>, SpikeCodegenError> {
    let sources = generate_module_sources(merged, backend)?;

    let io_error = |path: &Path, e: std::io::Error| RuntimeError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    fs::create_dir_all(directory).map_err(|e| io_error(directory, e))?;

    sources
        .par_iter()
        .map(|(file, code)| {
            let path = directory.join(file);
            fs::write(&path, code).map_err(|e| io_error(&path, e))?;
            Ok(())
        })
        .collect::<Result<Vec<()>, RuntimeError>>()?;

    tracing::info!(
        "wrote {} sources for {} ({}) to {}",
        sources.len(),
        merged.model.name,
        backend.platform().name(),
        directory.display(),
    );

    Ok(sources.into_keys().collect())
}

#[cfg(test)]
mod tests {
    use crate::config::{Platform, Preferences};
    use crate::codegen::backend::Backend;
    use crate::groups::ModelSpec;
    use crate::merged::ModelMerged;
    use crate::models::{neuron_models, param_values, VarInit};
    use super::generate_module_sources;

    fn izhikevich_model() -> ModelSpec {
        let mut model = ModelSpec::new("izk");
        model.set_dt(0.5).unwrap();
        let params = param_values(&[("a", 0.02), ("b", 0.2), ("c", -65.0), ("d", 8.0)]);
        let vars = [("V", VarInit::constant(-65.0)), ("U", VarInit::constant(-20.0))]
            .into_iter().map(|(n, v)| (n.to_string(), v)).collect();
        model.add_neuron_population("Exc", 20, neuron_models::izhikevich(), params, vars).unwrap();
        model.finalise().unwrap();
        model
    }

    #[test]
    fn test_all_files_generated() {
        let model = izhikevich_model();
        let merged = ModelMerged::new(&model).unwrap();
        let sources = generate_module_sources(&merged, &Backend::new(Preferences::default()).unwrap()).unwrap();

        let files: Vec<&str> = sources.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            files,
            vec!["customUpdate.cc", "definitions.h", "init.cc", "neuronUpdate.cc", "runner.cc", "synapseUpdate.cc"],
        );

        let definitions = &sources["definitions.h"];
        assert!(definitions.contains("typedef float scalar;"));
        assert!(definitions.contains("#define DT 5.000000000e-1f"));

        let runner = &sources["runner.cc"];
        assert!(runner.contains("EXPORT_FUNC void stepTime(unsigned long long timestep, unsigned int numRecordingTimesteps) {"));
        assert!(runner.contains("allocateNeuronUpdateMergedGroups();"));
        assert!(runner.contains("cudaSetDevice(0)"));
    }

    #[test]
    fn test_opencl_runner_builds_programs() {
        let model = izhikevich_model();
        let merged = ModelMerged::new(&model).unwrap();
        let preferences = Preferences { platform: Platform::OpenCL, ..Preferences::default() };
        let sources = generate_module_sources(&merged, &Backend::new(preferences).unwrap()).unwrap();

        let runner = &sources["runner.cc"];
        assert!(runner.contains("cl::CommandQueue commandQueue;"));
        assert!(runner.contains("buildNeuronUpdateProgram();"));
    }
}
