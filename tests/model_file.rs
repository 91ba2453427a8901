#[cfg(test)]
mod tests {
    use spike_codegen::codegen::{generate_module_sources, Backend};
    use spike_codegen::config::{load_model, parse_model, Preferences};
    use spike_codegen::error::{ConfigurationError, SpikeCodegenError};
    use spike_codegen::groups::{GroupKind, GroupRef};
    use spike_codegen::merged::ModelMerged;
    use spike_codegen::runtime::{MockLibrary, PushValue, Runtime};


    const DRIVEN: &str = r#"
        name = "driven"
        dt = 1.0

        [[neuron_models]]
        name = "Driven"
        vars = [{ name = "V" }]
        extra_global_params = [{ name = "input", type = "scalar*" }]
        sim_code = "V += input[id] * dt;"
        threshold_condition_code = "V >= 1.0"
        reset_code = "V = 0.0;"

        [[neurons]]
        name = "Pop"
        size = 10
        model = "Driven"
        vars = { V = 0.0 }
    "#;

    #[test]
    fn test_declared_model_shadows_built_in() {
        let contents = r#"
            name = "shadow"

            [[neuron_models]]
            name = "LIF"
            params = ["tau"]
            vars = [{ name = "V" }]
            sim_code = "V -= V / tau;"

            [[neurons]]
            name = "Pop"
            size = 4
            model = "LIF"
            params = { tau = 10.0 }
            vars = { V = 1.0 }
        "#;
        let model = parse_model(contents).unwrap();

        let group = model.get_neuron_group("Pop").unwrap();
        assert_eq!(group.model.snippet.params, vec!["tau".to_string()]);
        assert_eq!(group.model.vars.len(), 1);
        assert!(!model.is_finalised());
    }

    #[test]
    fn test_missing_params_are_reported() {
        let contents = r#"
            name = "missing"

            [[neurons]]
            name = "Pop"
            size = 4
            model = "Izhikevich"
            params = { a = 0.02, b = 0.2 }
            vars = { V = -65.0, U = -20.0 }
        "#;

        match parse_model(contents) {
            Err(SpikeCodegenError::ConfigurationRelatedError(ConfigurationError::WrongNumberOfValues {
                kind, expected, actual, ..
            })) => {
                assert_eq!(kind, "params");
                assert_eq!(expected, 4);
                assert_eq!(actual, 2);
            },
            other => panic!("unexpected result {:?}", other.map(|m| m.name)),
        }
    }

    #[test]
    fn test_uniform_initialiser_needs_min_and_max() {
        let with_vars = |v_init: &str| format!(r#"
            name = "uniform"

            [[neurons]]
            name = "Pop"
            size = 4
            model = "Izhikevich"
            params = {{ a = 0.02, b = 0.2, c = -65.0, d = 8.0 }}
            vars = {{ V = {}, U = -20.0 }}
        "#, v_init);

        match parse_model(&with_vars(r#"{ snippet = "Uniform", params = { min = -70.0 } }"#)) {
            Err(SpikeCodegenError::ConfigurationRelatedError(ConfigurationError::WrongNumberOfValues {
                description, kind, expected, actual,
            })) => {
                assert!(description.contains("'V'"));
                assert_eq!(kind, "params");
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            },
            other => panic!("unexpected result {:?}", other.map(|m| m.name)),
        }

        match parse_model(&with_vars(r#"{ snippet = "Uniform", params = { min = -70.0, top = -60.0 } }"#)) {
            Err(SpikeCodegenError::ConfigurationRelatedError(ConfigurationError::MissingValue { kind, name, .. })) => {
                assert_eq!(kind, "param");
                assert_eq!(name, "max");
            },
            other => panic!("unexpected result {:?}", other.map(|m| m.name)),
        }

        let model = parse_model(&with_vars(r#"{ snippet = "Uniform", params = { min = -70.0, max = -60.0 } }"#)).unwrap();
        assert_eq!(model.get_neuron_group("Pop").unwrap().num_neurons, 4);
    }

    #[test]
    fn test_duplicate_population_is_rejected() {
        let contents = r#"
            name = "duplicate"

            [[neurons]]
            name = "Pop"
            size = 4
            model = "Poisson"
            params = { rate = 10.0 }
            vars = { timeStepToSpike = 0.0 }

            [[neurons]]
            name = "Pop"
            size = 8
            model = "Poisson"
            params = { rate = 20.0 }
            vars = { timeStepToSpike = 0.0 }
        "#;
        let error = parse_model(contents).unwrap_err();

        assert_eq!(error.to_string(), "Cannot add a neuron population with duplicate name:'Pop'");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let contents = "name = \"m\"\n[[neurons]]\nname = \"A\"\nsize = 1\nmodel = \"LIF\"\ncolour = \"red\"\n";

        assert!(matches!(parse_model(contents), Err(SpikeCodegenError::ConfigParseError(_))));
    }

    #[test]
    fn test_loaded_model_generates() -> Result<(), SpikeCodegenError> {
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("driven.toml");
        std::fs::write(&path, DRIVEN)?;

        let mut model = load_model(&path)?;
        model.finalise()?;
        let merged = ModelMerged::new(&model)?;
        let sources = generate_module_sources(&merged, &Backend::new(Preferences::default())?)?;

        assert!(sources["neuronUpdate.cc"].contains("group->input[lid]"));
        assert!(sources["neuronUpdate.cc"].contains("EXPORT_FUNC void pushMergedNeuronUpdateGroup0inputToDevice("));

        Ok(())
    }

    #[test]
    fn test_extra_global_param_pushed_once_allocated() -> Result<(), SpikeCodegenError> {
        let mut model = parse_model(DRIVEN)?;
        model.finalise()?;
        let merged = ModelMerged::new(&model)?;
        let mut runtime = Runtime::new(&merged, MockLibrary::new(&[]));
        runtime.allocate(None)?;

        let owner = GroupRef::new(GroupKind::NeuronGroup, "Pop");
        let destinations = merged.get_dynamic_field_destinations(&owner, "input");
        assert!(!destinations.is_empty());
        for destination in destinations {
            assert!(runtime.library().pushed_values(&destination.push_function_name()).is_empty());
        }

        runtime.allocate_extra_global_param(&owner, "input", 10)?;
        let input = runtime.get_array(&owner, "input")?;
        assert_eq!(input.len(), 10);
        let pointer = input.device.unwrap();

        for destination in destinations {
            let pushes = runtime.library().pushed_values(&destination.push_function_name());
            assert_eq!(pushes, vec![(destination.member_index as u32, PushValue::Pointer(pointer))]);
        }

        runtime.set_values(&owner, "input", &[0.25; 10])?;
        runtime.push_array_to_device(&owner, "input")?;
        assert!(runtime.allocate_extra_global_param(&owner, "input", 10).is_err());

        Ok(())
    }
}
