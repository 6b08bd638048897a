//! Fixture modules for the test suites.
//!
//! The canonical shapes the weaver has to handle: the three-object
//! View/ViewModel/Model chain, an abstract origin with two concrete
//! overrides, an interface-typed binding target, and the converter zoo
//! with one valid and several deliberately broken converter shapes.
use weftir::{
    module::{
        FieldKey, MemberRef, MethodFlags, MethodKey, Module, ParamDef, PropertyKey, TypeKey,
        Visibility,
    },
    typeref::TypeRef,
};

/// `View -> ViewModel -> Model`, each with a string `text` property.
pub struct ChainFixture {
    pub module: Module,
    pub view: TypeKey,
    pub view_model: TypeKey,
    pub model: TypeKey,
    pub view_text: PropertyKey,
    pub vm_text: PropertyKey,
    pub model_text: PropertyKey,
    /// `View::_view_model`, the declared link to the ViewModel.
    pub view_vm_field: FieldKey,
    /// `ViewModel::_model`, the declared link to the Model.
    pub vm_model_field: FieldKey,
    pub view_to_vm: MemberRef,
    pub vm_to_model: MemberRef,
    /// Binding initializer on the View; starts out empty and is populated
    /// by accessor weaving.
    pub view_init: MethodKey,
    /// Binding initializer on the ViewModel, for bindings it is the
    /// source of.
    pub vm_init: MethodKey,
}

pub fn chain_fixture() -> ChainFixture {
    let mut module = Module::new("mvvm");
    let view = module.declare_class("View");
    let view_model = module.declare_class("ViewModel");
    let model = module.declare_class("Model");

    let view_text = module
        .declare_auto_property(view, "text", TypeRef::Str, MethodFlags::empty())
        .unwrap();
    let vm_text = module
        .declare_auto_property(view_model, "text", TypeRef::Str, MethodFlags::empty())
        .unwrap();
    let model_text = module
        .declare_auto_property(model, "text", TypeRef::Str, MethodFlags::empty())
        .unwrap();

    let view_vm_field = module
        .declare_field(
            view,
            "_view_model",
            TypeRef::Named(view_model),
            Visibility::Assembly,
        )
        .unwrap();
    let vm_model_field = module
        .declare_field(
            view_model,
            "_model",
            TypeRef::Named(model),
            Visibility::Assembly,
        )
        .unwrap();

    let view_init = module
        .declare_method(
            view,
            "initialize_bindings",
            [],
            None,
            MethodFlags::empty(),
            Visibility::Public,
        )
        .unwrap();
    let vm_init = module
        .declare_method(
            view_model,
            "initialize_bindings",
            [],
            None,
            MethodFlags::empty(),
            Visibility::Public,
        )
        .unwrap();

    ChainFixture {
        module,
        view,
        view_model,
        model,
        view_text,
        vm_text,
        model_text,
        view_vm_field,
        vm_model_field,
        view_to_vm: MemberRef::Field(view_vm_field),
        vm_to_model: MemberRef::Field(vm_model_field),
        view_init,
        vm_init,
    }
}

/// An abstract `Control.value` with concrete overrides on `Slider` and
/// `Knob`, each linked to a `Sink` carrying the bound destination.
pub struct HierarchyFixture {
    pub module: Module,
    pub control: TypeKey,
    pub slider: TypeKey,
    pub knob: TypeKey,
    pub sink: TypeKey,
    /// Abstract property on the Control.
    pub control_value: PropertyKey,
    pub slider_value: PropertyKey,
    pub knob_value: PropertyKey,
    pub sink_value: PropertyKey,
    /// `Control::_sink`, inherited by both subclasses.
    pub sink_field: FieldKey,
    pub sink_member: MemberRef,
}

pub fn hierarchy_fixture() -> HierarchyFixture {
    let mut module = Module::new("controls");
    let control = module.declare_class("Control");
    module.types[control].is_abstract = true;
    let slider = module.declare_subclass("Slider", control);
    let knob = module.declare_subclass("Knob", control);
    let sink = module.declare_class("Sink");

    let control_value = module
        .declare_auto_property(control, "value", TypeRef::Int, MethodFlags::ABSTRACT)
        .unwrap();
    let slider_value = module
        .declare_auto_property(slider, "value", TypeRef::Int, MethodFlags::VIRTUAL)
        .unwrap();
    let knob_value = module
        .declare_auto_property(knob, "value", TypeRef::Int, MethodFlags::VIRTUAL)
        .unwrap();
    let sink_value = module
        .declare_auto_property(sink, "value", TypeRef::Int, MethodFlags::empty())
        .unwrap();

    let sink_field = module
        .declare_field(control, "_sink", TypeRef::Named(sink), Visibility::Assembly)
        .unwrap();

    HierarchyFixture {
        module,
        control,
        slider,
        knob,
        sink,
        control_value,
        slider_value,
        knob_value,
        sink_value,
        sink_field,
        sink_member: MemberRef::Field(sink_field),
    }
}

/// A `Document` bound to an interface-typed `Display` with one concrete
/// `Widget` implementer.
pub struct InterfaceFixture {
    pub module: Module,
    pub document: TypeKey,
    pub display: TypeKey,
    pub widget: TypeKey,
    pub document_title: PropertyKey,
    /// Abstract property on the interface.
    pub display_title: PropertyKey,
    pub widget_title: PropertyKey,
    /// `Document::_display`, typed as the interface.
    pub display_field: FieldKey,
    pub display_member: MemberRef,
    pub document_init: MethodKey,
}

pub fn interface_fixture() -> InterfaceFixture {
    let mut module = Module::new("docs");
    let document = module.declare_class("Document");
    let display = module.declare_interface("Display");
    let widget = module.declare_class("Widget");
    module.add_interface(widget, display);

    let document_title = module
        .declare_auto_property(document, "title", TypeRef::Str, MethodFlags::empty())
        .unwrap();
    let display_title = module
        .declare_auto_property(display, "title", TypeRef::Str, MethodFlags::ABSTRACT)
        .unwrap();
    let widget_title = module
        .declare_auto_property(widget, "title", TypeRef::Str, MethodFlags::VIRTUAL)
        .unwrap();

    let display_field = module
        .declare_field(
            document,
            "_display",
            TypeRef::Named(display),
            Visibility::Assembly,
        )
        .unwrap();
    let document_init = module
        .declare_method(
            document,
            "initialize_bindings",
            [],
            None,
            MethodFlags::empty(),
            Visibility::Public,
        )
        .unwrap();

    InterfaceFixture {
        module,
        document,
        display,
        widget,
        document_title,
        display_title,
        widget_title,
        display_field,
        display_member: MemberRef::Field(display_field),
        document_init,
    }
}

/// A `Source.count` (int) bound into `Target.label` (str), plus converter
/// types covering every validation outcome.
pub struct ConverterFixture {
    pub module: Module,
    pub source: TypeKey,
    pub target: TypeKey,
    pub source_count: PropertyKey,
    pub target_label: PropertyKey,
    pub link_field: FieldKey,
    pub link: MemberRef,
    /// Valid: implements the capability, concrete, default ctor,
    /// `convert(int) -> str`.
    pub good: TypeKey,
    /// Lacks a public parameterless constructor.
    pub no_ctor: TypeKey,
    /// Abstract.
    pub abstract_converter: TypeKey,
    /// Does not implement the capability interface.
    pub not_a_converter: TypeKey,
    /// Generic definition over (TFrom, TTo); valid only as an instantiation.
    pub generic_converter: TypeKey,
}

pub fn converter_fixture() -> ConverterFixture {
    let mut module = Module::new("conversions");
    let source = module.declare_class("Source");
    let target = module.declare_class("Target");
    let capability = module.declare_interface("ValueConverter");

    let source_count = module
        .declare_auto_property(source, "count", TypeRef::Int, MethodFlags::empty())
        .unwrap();
    let target_label = module
        .declare_auto_property(target, "label", TypeRef::Str, MethodFlags::empty())
        .unwrap();
    let link_field = module
        .declare_field(source, "_target", TypeRef::Named(target), Visibility::Assembly)
        .unwrap();

    let good = module.declare_class("CountToLabel");
    module.add_interface(good, capability);
    module
        .declare_method(good, "new", [], None, MethodFlags::CTOR, Visibility::Public)
        .unwrap();
    let convert = module
        .declare_method(
            good,
            "convert",
            [ParamDef::new("value", TypeRef::Int)],
            Some(TypeRef::Str),
            MethodFlags::empty(),
            Visibility::Public,
        )
        .unwrap();
    module
        .append(convert, [weftir::instr::Instr::LoadParam(0)])
        .unwrap();

    let no_ctor = module.declare_class("NoCtorConverter");
    module.add_interface(no_ctor, capability);
    module
        .declare_method(
            no_ctor,
            "convert",
            [ParamDef::new("value", TypeRef::Int)],
            Some(TypeRef::Str),
            MethodFlags::empty(),
            Visibility::Public,
        )
        .unwrap();

    let abstract_converter = module.declare_class("AbstractConverter");
    module.types[abstract_converter].is_abstract = true;
    module.add_interface(abstract_converter, capability);

    let not_a_converter = module.declare_class("JustAClass");
    module
        .declare_method(
            not_a_converter,
            "new",
            [],
            None,
            MethodFlags::CTOR,
            Visibility::Public,
        )
        .unwrap();

    let generic_converter = module.declare_class("PairConverter");
    module.add_interface(generic_converter, capability);
    module.types[generic_converter].generic_params =
        [String::from("TFrom"), String::from("TTo")].into_iter().collect();
    module
        .declare_method(
            generic_converter,
            "new",
            [],
            None,
            MethodFlags::CTOR,
            Visibility::Public,
        )
        .unwrap();
    let generic_convert = module
        .declare_method(
            generic_converter,
            "convert",
            [ParamDef::new("value", TypeRef::Param(0))],
            Some(TypeRef::Param(1)),
            MethodFlags::empty(),
            Visibility::Public,
        )
        .unwrap();
    module
        .append(generic_convert, [weftir::instr::Instr::LoadParam(0)])
        .unwrap();

    ConverterFixture {
        module,
        source,
        target,
        source_count,
        target_label,
        link_field,
        link: MemberRef::Field(link_field),
        good,
        no_ctor,
        abstract_converter,
        not_a_converter,
        generic_converter,
    }
}
