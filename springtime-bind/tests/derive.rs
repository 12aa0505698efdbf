#[cfg(feature = "derive")]
mod field_table_derive_test {
    use springtime_bind::component_type::{
        ComponentType, Constructor, FieldTable, SlotKind,
    };
    use springtime_bind::context::ComponentContext;
    use springtime_bind::descriptor::{
        Capability, Cardinality, DependencyDescriptor, ReferencePolicy,
    };
    use springtime_bind::provider::{Properties, PropertiesView, ProviderHandle, ProviderSnapshot};
    use springtime_bind::slot::{ActivationSlot, Reference, ReferenceList};
    use springtime_bind::{BindOutcome, FieldTable};
    use std::sync::Arc;

    struct Codec;

    #[derive(Default, FieldTable)]
    struct MediaPipeline {
        decoder: Reference<Arc<Codec>>,
        #[binding(name = "filters")]
        filter_chain: ReferenceList<Arc<Codec>>,
        properties: ActivationSlot<PropertiesView>,
        #[binding(ignore)]
        _shadow: Reference<Arc<Codec>>,
        _frames: u64,
    }

    #[derive(Default, FieldTable)]
    #[binding(name = "sink")]
    struct AudioSink;

    #[test]
    fn should_generate_field_table() {
        assert_eq!(MediaPipeline::component_name(), "media_pipeline");
        assert_eq!(AudioSink::component_name(), "sink");

        let targets = MediaPipeline::field_targets();
        assert_eq!(
            targets.iter().map(|target| target.name()).collect::<Vec<_>>(),
            vec!["decoder", "filters"]
        );
        assert_eq!(targets[0].info().kind, SlotKind::Unary);
        assert_eq!(targets[1].info().kind, SlotKind::Collection);

        let activation_fields = MediaPipeline::activation_fields();
        assert_eq!(activation_fields.len(), 1);
        assert_eq!(activation_fields[0].name(), "properties");

        assert!(AudioSink::field_targets().is_empty());
    }

    #[test]
    fn should_bind_into_derived_fields() {
        let component_type =
            ComponentType::from_table(Constructor::<MediaPipeline>::from_default())
                .with_dependency(
                    DependencyDescriptor::builder("decoder", Capability::of::<Codec>())
                        .field("decoder")
                        .build(),
                )
                .with_dependency(
                    DependencyDescriptor::builder("filters", Capability::of::<Codec>())
                        .cardinality(Cardinality::OptionalMultiple)
                        .policy(ReferencePolicy::Dynamic)
                        .field("filters")
                        .build(),
                )
                .build()
                .unwrap();

        let mut properties = Properties::new();
        properties.insert("format".to_string(), "mp4".into());

        let instance = component_type
            .construct(
                &ProviderSnapshot::new().with_provider(
                    "decoder",
                    ProviderHandle::for_service(1, Arc::new(Codec), Properties::new()),
                ),
                ComponentContext::new("media_pipeline", properties),
            )
            .unwrap();

        let pipeline = instance.instance();
        assert!(pipeline.decoder.is_set());
        assert!(pipeline.filter_chain.is_empty());
        assert_eq!(
            pipeline.properties.get().unwrap().get("format"),
            Some(&"mp4".into())
        );

        assert_eq!(
            instance
                .on_bind(
                    "filters",
                    &ProviderHandle::for_service(2, Arc::new(Codec), Properties::new())
                )
                .unwrap(),
            BindOutcome::Applied
        );
        assert_eq!(pipeline.filter_chain.len(), 1);
        assert!(!pipeline._shadow.is_set());
    }
}
