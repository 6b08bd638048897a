//! End-to-end weaving semantics: propagation, dedup, null guards and the
//! two-way cycle exclusion, exercised through the sandbox evaluator.
use weftcore::{
    binder::{BindingDeclaration, Direction, bind},
    sandbox::{Sandbox, SandboxError, Value},
    tests_utils::chain_fixture,
    weaver::Weaver,
};
use weftir::instr::Instr;

fn text(value: &str) -> Value {
    Value::Str(String::from(value))
}

#[test]
fn one_way_binding_propagates_into_the_target() {
    let fixture = chain_fixture();
    let declaration =
        BindingDeclaration::new(fixture.view_text, Direction::OneWay, fixture.view_to_vm);
    let mut weaver = Weaver::new(fixture.module);
    bind(&mut weaver, &declaration).unwrap();
    let module = weaver.finish();

    let mut sandbox = Sandbox::new(&module);
    let view = sandbox.instantiate(fixture.view);
    let vm = sandbox.instantiate(fixture.view_model);
    sandbox.set_field(view, fixture.view_vm_field, Value::Obj(vm));

    sandbox
        .set_property(view, fixture.view_text, text("hello"))
        .unwrap();

    assert_eq!(sandbox.property(vm, fixture.vm_text).unwrap(), text("hello"));
    assert_eq!(
        sandbox.property(view, fixture.view_text).unwrap(),
        text("hello"),
        "the origin setter must still perform its own assignment"
    );
}

#[test]
fn duplicate_declarations_propagate_exactly_once() {
    let fixture = chain_fixture();
    let declaration =
        BindingDeclaration::new(fixture.view_text, Direction::OneWay, fixture.view_to_vm);
    let mut weaver = Weaver::new(fixture.module);
    bind(&mut weaver, &declaration).unwrap();
    bind(&mut weaver, &declaration).unwrap();
    let module = weaver.finish();

    let from_setter = module.properties[fixture.view_text].setter.unwrap();
    let helper_calls = Instr::flatten(module.body(from_setter))
        .flat_map(Instr::called_methods)
        .filter(|&method| module.methods[method].name.starts_with("__weft_from_"))
        .count();
    assert_eq!(helper_calls, 1);
}

#[test]
fn two_way_binding_settles_without_echo() {
    let fixture = chain_fixture();
    let mut declaration =
        BindingDeclaration::new(fixture.view_text, Direction::TwoWay, fixture.view_to_vm);
    declaration.initializer = Some(String::from("initialize_bindings"));
    let mut weaver = Weaver::new(fixture.module);
    bind(&mut weaver, &declaration).unwrap();
    let module = weaver.finish();

    let mut sandbox = Sandbox::new(&module);
    let view = sandbox.instantiate(fixture.view);
    let vm = sandbox.instantiate(fixture.view_model);
    sandbox.set_field(view, fixture.view_vm_field, Value::Obj(vm));
    sandbox.call(view, fixture.view_init, Vec::new()).unwrap();

    // forward: the helper entered from the view must not call back
    sandbox
        .set_property(view, fixture.view_text, text("a"))
        .unwrap();
    assert_eq!(sandbox.property(vm, fixture.vm_text).unwrap(), text("a"));

    // backward: the helper entered from the view model must not call back
    sandbox.set_property(vm, fixture.vm_text, text("b")).unwrap();
    assert_eq!(sandbox.property(view, fixture.view_text).unwrap(), text("b"));
    assert_eq!(sandbox.property(vm, fixture.vm_text).unwrap(), text("b"));
}

#[test]
fn two_way_helpers_exclude_their_own_back_edge() {
    let fixture = chain_fixture();
    let mut declaration =
        BindingDeclaration::new(fixture.view_text, Direction::TwoWay, fixture.view_to_vm);
    declaration.initializer = Some(String::from("initialize_bindings"));
    let mut weaver = Weaver::new(fixture.module);
    bind(&mut weaver, &declaration).unwrap();
    let module = weaver.finish();

    let view_setter = module.properties[fixture.view_text].setter.unwrap();
    let vm_setter = module.properties[fixture.vm_text].setter.unwrap();
    let forward_helper = module
        .methods
        .iter()
        .find(|(_, def)| def.name.starts_with("__weft_from_View__set_text_to_ViewModel__set_text"))
        .map(|(key, _)| key)
        .expect("forward helper exists");
    let backward_helper = module
        .methods
        .iter()
        .find(|(_, def)| def.name.starts_with("__weft_from_ViewModel__set_text_to_View__set_text"))
        .map(|(key, _)| key)
        .expect("backward helper exists");

    // the helper the view model uses to reach the view never re-enters
    // the view model, and vice versa
    for instr in Instr::flatten(module.body(backward_helper)) {
        for callee in instr.called_methods() {
            assert_ne!(callee, vm_setter);
            assert_ne!(callee, forward_helper);
        }
    }
    for instr in Instr::flatten(module.body(forward_helper)) {
        for callee in instr.called_methods() {
            assert_ne!(callee, view_setter);
            assert_ne!(callee, backward_helper);
        }
    }
}

#[test]
fn null_guard_skips_unresolved_targets() {
    let fixture = chain_fixture();
    let mut declaration =
        BindingDeclaration::new(fixture.view_text, Direction::OneWay, fixture.view_to_vm);
    declaration.null_check = true;
    let mut weaver = Weaver::new(fixture.module);
    bind(&mut weaver, &declaration).unwrap();
    let module = weaver.finish();

    let mut sandbox = Sandbox::new(&module);
    let view = sandbox.instantiate(fixture.view);
    // the view model link is left unset

    sandbox
        .set_property(view, fixture.view_text, text("quiet"))
        .unwrap();
    assert_eq!(
        sandbox.property(view, fixture.view_text).unwrap(),
        text("quiet")
    );
}

#[test]
fn inaccessible_destination_setters_are_rejected() {
    let mut fixture = chain_fixture();
    let vm_setter = fixture.module.properties[fixture.vm_text].setter.unwrap();
    fixture.module.methods[vm_setter].visibility = weftir::module::Visibility::Private;

    let declaration =
        BindingDeclaration::new(fixture.view_text, Direction::OneWay, fixture.view_to_vm);
    let mut weaver = Weaver::new(fixture.module);
    let result = bind(&mut weaver, &declaration);
    assert!(matches!(
        result,
        Err(weftcore::utils::error::WeaveError::Inaccessible { .. })
    ));
}

#[test]
fn method_bindings_invoke_the_callback_with_the_written_value() {
    let mut fixture = chain_fixture();
    let log_field = fixture
        .module
        .declare_field(
            fixture.view_model,
            "_last_seen",
            weftir::typeref::TypeRef::Str,
            weftir::module::Visibility::Private,
        )
        .unwrap();
    let callback = fixture
        .module
        .declare_method(
            fixture.view_model,
            "on_text",
            [weftir::module::ParamDef::new(
                "value",
                weftir::typeref::TypeRef::Str,
            )],
            None,
            weftir::module::MethodFlags::empty(),
            weftir::module::Visibility::Public,
        )
        .unwrap();
    fixture
        .module
        .append(
            callback,
            [
                Instr::LoadSelf,
                Instr::LoadParam(0),
                Instr::StoreField(log_field),
            ],
        )
        .unwrap();

    let declaration = weftcore::binder::MethodBindingDeclaration {
        source_property: fixture.view_text,
        target_method: String::from("on_text"),
        targets: vec![fixture.view_to_vm],
        null_check: false,
    };
    let mut weaver = Weaver::new(fixture.module);
    weftcore::binder::bind_method(&mut weaver, &declaration).unwrap();
    let module = weaver.finish();

    // callbacks are invoked directly, no helper is generated
    assert!(
        module
            .methods
            .iter()
            .all(|(_, def)| !def.name.starts_with("__weft_from_"))
    );

    let mut sandbox = Sandbox::new(&module);
    let view = sandbox.instantiate(fixture.view);
    let vm = sandbox.instantiate(fixture.view_model);
    sandbox.set_field(view, fixture.view_vm_field, Value::Obj(vm));
    sandbox
        .set_property(view, fixture.view_text, text("observed"))
        .unwrap();
    assert_eq!(sandbox.field(vm, log_field), text("observed"));
}

#[test]
fn without_null_guard_an_unset_target_fails() {
    let fixture = chain_fixture();
    let declaration =
        BindingDeclaration::new(fixture.view_text, Direction::OneWay, fixture.view_to_vm);
    let mut weaver = Weaver::new(fixture.module);
    bind(&mut weaver, &declaration).unwrap();
    let module = weaver.finish();

    let mut sandbox = Sandbox::new(&module);
    let view = sandbox.instantiate(fixture.view);

    let result = sandbox.set_property(view, fixture.view_text, text("loud"));
    assert!(matches!(result, Err(SandboxError::NullReference { .. })));
}
