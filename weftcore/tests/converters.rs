//! Converter validation and accessor bookkeeping.
use weftcore::{
    binder::{BindingDeclaration, Direction, bind},
    sandbox::{Sandbox, Value},
    tests_utils::converter_fixture,
    utils::error::WeaveError,
    weaver::{AccessorRequest, Weaver},
};
use weftir::{
    module::{MemberRef, MethodFlags, Module, Visibility},
    typeref::TypeRef,
};

#[test]
fn valid_converter_is_woven_and_invoked() {
    let fixture = converter_fixture();
    let mut declaration =
        BindingDeclaration::new(fixture.source_count, Direction::OneWay, fixture.link);
    declaration.target_property = Some(String::from("label"));
    declaration.converter = Some(TypeRef::Named(fixture.good));
    let mut weaver = Weaver::new(fixture.module);
    bind(&mut weaver, &declaration).unwrap();
    let module = weaver.finish();

    let mut sandbox = Sandbox::new(&module);
    let source = sandbox.instantiate(fixture.source);
    let target = sandbox.instantiate(fixture.target);
    sandbox.set_field(source, fixture.link_field, Value::Obj(target));

    sandbox
        .set_property(source, fixture.source_count, Value::Int(3))
        .unwrap();
    // the fixture converter passes the value through
    assert_eq!(
        sandbox.property(target, fixture.target_label).unwrap(),
        Value::Int(3)
    );
}

#[test]
fn generic_converter_instantiation_matches_by_substitution() {
    let fixture = converter_fixture();
    let mut declaration =
        BindingDeclaration::new(fixture.source_count, Direction::OneWay, fixture.link);
    declaration.target_property = Some(String::from("label"));
    declaration.converter = Some(TypeRef::Generic {
        definition: fixture.generic_converter,
        arguments: vec![TypeRef::Int, TypeRef::Str],
    });
    let mut weaver = Weaver::new(fixture.module);
    bind(&mut weaver, &declaration).unwrap();
    let module = weaver.finish();

    let mut sandbox = Sandbox::new(&module);
    let source = sandbox.instantiate(fixture.source);
    let target = sandbox.instantiate(fixture.target);
    sandbox.set_field(source, fixture.link_field, Value::Obj(target));
    sandbox
        .set_property(source, fixture.source_count, Value::Int(9))
        .unwrap();
    assert_eq!(
        sandbox.property(target, fixture.target_label).unwrap(),
        Value::Int(9)
    );
}

#[test]
fn converter_instance_field_is_cached_per_host_and_type() {
    let mut fixture = converter_fixture();
    fixture
        .module
        .declare_auto_property(fixture.target, "caption", TypeRef::Str, MethodFlags::empty())
        .unwrap();

    let mut first =
        BindingDeclaration::new(fixture.source_count, Direction::OneWay, fixture.link);
    first.target_property = Some(String::from("label"));
    first.converter = Some(TypeRef::Named(fixture.good));
    let mut second = first.clone();
    second.target_property = Some(String::from("caption"));

    let mut weaver = Weaver::new(fixture.module);
    bind(&mut weaver, &first).unwrap();
    bind(&mut weaver, &second).unwrap();
    let module = weaver.finish();

    let converter_fields = module
        .fields
        .iter()
        .filter(|(_, def)| def.name.starts_with("__weft_converter_"))
        .count();
    assert_eq!(converter_fields, 1);
}

#[test]
fn converter_rejections_are_specific_and_leave_the_origin_untouched() {
    let cases: Vec<(fn(&weftcore::tests_utils::ConverterFixture) -> TypeRef, fn(&WeaveError) -> bool)> = vec![
        (
            |fixture| TypeRef::Named(fixture.no_ctor),
            |error| error.is_missing_default_ctor(),
        ),
        (
            |fixture| TypeRef::Named(fixture.abstract_converter),
            |error| error.is_abstract_converter(),
        ),
        (
            |fixture| TypeRef::Named(fixture.not_a_converter),
            |error| error.is_not_a_converter(),
        ),
        (
            |fixture| TypeRef::Named(fixture.generic_converter),
            |error| error.is_open_generic_converter(),
        ),
    ];

    for (converter_of, is_expected) in cases {
        let fixture = converter_fixture();
        let converter = converter_of(&fixture);
        let mut declaration =
            BindingDeclaration::new(fixture.source_count, Direction::OneWay, fixture.link);
        declaration.target_property = Some(String::from("label"));
        declaration.converter = Some(converter);

        let original = {
            let setter = fixture.module.properties[fixture.source_count].setter.unwrap();
            fixture.module.body(setter).to_vec()
        };

        let mut weaver = Weaver::new(fixture.module);
        let error = bind(&mut weaver, &declaration).unwrap_err();
        assert!(is_expected(&error), "unexpected rejection: {error}");

        let module = weaver.finish();
        let setter = module.properties[fixture.source_count].setter.unwrap();
        assert_eq!(
            module.body(setter),
            &original[..],
            "a rejected converter must not modify the origin setter"
        );
    }
}

#[test]
fn mismatched_conversion_method_is_rejected() {
    let fixture = converter_fixture();
    // bind str -> str, while the converter only offers int -> str
    let mut declaration = BindingDeclaration::new(
        fixture.target_label,
        Direction::OneWay,
        MemberRef::Field(fixture.link_field),
    );
    declaration.converter = Some(TypeRef::Named(fixture.good));
    declaration.target_property = Some(String::from("label"));

    // rebuild the link on the target side so the edge is label -> label
    let mut module = fixture.module;
    let back_link = module
        .declare_field(
            fixture.target,
            "_other",
            TypeRef::Named(fixture.target),
            Visibility::Assembly,
        )
        .unwrap();
    declaration.targets = vec![MemberRef::Field(back_link)];

    let mut weaver = Weaver::new(module);
    let error = bind(&mut weaver, &declaration).unwrap_err();
    assert!(error.is_mismatched_converter(), "got: {error}");
}

#[test]
fn accessor_is_created_once_and_reused() {
    let fixture = converter_fixture();
    let mut module = fixture.module;
    let initializer = module
        .declare_method(
            fixture.source,
            "initialize_bindings",
            [],
            None,
            MethodFlags::empty(),
            Visibility::Public,
        )
        .unwrap();

    let request = AccessorRequest {
        source_type: fixture.source,
        target_type: fixture.target,
        binding_target: fixture.link,
        binding_initializer: initializer,
        throw_on_failure: true,
    };
    let mut weaver = Weaver::new(module);
    let first = weaver.weave_accessor(&request).unwrap();
    let second = weaver.weave_accessor(&request).unwrap();
    assert_eq!(first, second);

    let module = weaver.finish();
    let backing_fields = module
        .fields
        .iter()
        .filter(|(_, def)| def.name.starts_with("__weft_Source"))
        .count();
    assert_eq!(backing_fields, 1, "no duplicate backing field");
}

#[test]
fn ambiguous_accessor_candidates_are_fatal() {
    let mut module = Module::new("ambiguous");
    let view = module.declare_class("View");
    let panel_base = module.declare_class("PanelBase");
    let panel = module.declare_subclass("Panel", panel_base);
    // both layers already declare a member with the accessor's name
    module
        .declare_auto_property(panel_base, "View", TypeRef::Str, MethodFlags::empty())
        .unwrap();
    module
        .declare_auto_property(panel, "View", TypeRef::Str, MethodFlags::empty())
        .unwrap();
    let link = module
        .declare_field(view, "_panel", TypeRef::Named(panel), Visibility::Assembly)
        .unwrap();
    let initializer = module
        .declare_method(
            view,
            "initialize_bindings",
            [],
            None,
            MethodFlags::empty(),
            Visibility::Public,
        )
        .unwrap();

    let mut weaver = Weaver::new(module);
    let result = weaver.weave_accessor(&AccessorRequest {
        source_type: view,
        target_type: panel,
        binding_target: MemberRef::Field(link),
        binding_initializer: initializer,
        throw_on_failure: true,
    });
    assert!(matches!(result, Err(WeaveError::AmbiguousAccessor { .. })));
}

#[test]
fn abstract_initializer_cascades_into_concrete_overrides() {
    let mut module = Module::new("cascade");
    let base = module.declare_class("SourceBase");
    module.types[base].is_abstract = true;
    let concrete = module.declare_subclass("Source", base);
    let holder = module.declare_class("Holder");
    let link = module
        .declare_field(base, "_holder", TypeRef::Named(holder), Visibility::Assembly)
        .unwrap();
    let abstract_init = module
        .declare_method(
            base,
            "initialize_bindings",
            [],
            None,
            MethodFlags::ABSTRACT,
            Visibility::Public,
        )
        .unwrap();
    let concrete_init = module
        .declare_method(
            concrete,
            "initialize_bindings",
            [],
            None,
            MethodFlags::VIRTUAL,
            Visibility::Public,
        )
        .unwrap();

    let mut weaver = Weaver::new(module);
    weaver
        .weave_accessor(&AccessorRequest {
            source_type: base,
            target_type: holder,
            binding_target: MemberRef::Field(link),
            binding_initializer: abstract_init,
            throw_on_failure: true,
        })
        .unwrap();

    let module = weaver.finish();
    assert!(module.body(abstract_init).is_empty());
    assert!(
        !module.body(concrete_init).is_empty(),
        "population must land in the concrete override"
    );
}

#[test]
fn abstract_initializer_without_overrides_is_fatal() {
    let mut module = Module::new("cascade");
    let base = module.declare_class("SourceBase");
    module.types[base].is_abstract = true;
    let holder = module.declare_class("Holder");
    let link = module
        .declare_field(base, "_holder", TypeRef::Named(holder), Visibility::Assembly)
        .unwrap();
    let abstract_init = module
        .declare_method(
            base,
            "initialize_bindings",
            [],
            None,
            MethodFlags::ABSTRACT,
            Visibility::Public,
        )
        .unwrap();

    let mut weaver = Weaver::new(module);
    let result = weaver.weave_accessor(&AccessorRequest {
        source_type: base,
        target_type: holder,
        binding_target: MemberRef::Field(link),
        binding_initializer: abstract_init,
        throw_on_failure: true,
    });
    assert!(matches!(
        result,
        Err(WeaveError::MissingConcreteInitializer { .. })
    ));
}
