//! Textual rendering of methods and bodies.
//!
//! Debug/diagnostic output only; nothing here is a stable serialization
//! format. Rendering needs the owning [`Module`] to resolve handles to
//! names, so the entry points hand out wrapper values implementing
//! [`std::fmt::Display`] instead of implementing it on the IR types
//! directly.
use crate::{
    instr::{Dispatch, Instr},
    module::{MethodKey, Module},
    typeref::TypeRef,
};

impl TypeRef {
    pub fn display<'a>(&'a self, module: &'a Module) -> impl std::fmt::Display + 'a {
        struct Fmt<'a> {
            ty: &'a TypeRef,
            module: &'a Module,
        }

        impl std::fmt::Display for Fmt<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.ty {
                    TypeRef::Int => write!(f, "int"),
                    TypeRef::Float => write!(f, "float"),
                    TypeRef::Str => write!(f, "str"),
                    TypeRef::Named(key) => write!(f, "{}", self.module.types[*key].name),
                    TypeRef::Generic {
                        definition,
                        arguments,
                    } => {
                        write!(f, "{}<", self.module.types[*definition].name)?;
                        for (index, argument) in arguments.iter().enumerate() {
                            if index > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}", argument.display(self.module))?;
                        }
                        write!(f, ">")
                    }
                    TypeRef::Param(index) => write!(f, "'{index}"),
                }
            }
        }

        Fmt { ty: self, module }
    }
}

fn write_instr(
    f: &mut std::fmt::Formatter<'_>,
    module: &Module,
    instr: &Instr,
    indent: usize,
) -> std::fmt::Result {
    let pad = "  ".repeat(indent);
    match instr {
        Instr::LoadSelf => writeln!(f, "{pad}load_self"),
        Instr::LoadParam(index) => writeln!(f, "{pad}load_param {index}"),
        Instr::LoadField(field) => {
            let def = &module.fields[*field];
            writeln!(f, "{pad}load_field {}::{}", module.types[def.declaring].name, def.name)
        }
        Instr::StoreField(field) => {
            let def = &module.fields[*field];
            writeln!(f, "{pad}store_field {}::{}", module.types[def.declaring].name, def.name)
        }
        Instr::Call(call) => {
            let mode = match call.dispatch {
                Dispatch::Static => "call",
                Dispatch::Virtual => "callvirt",
            };
            writeln!(f, "{pad}{mode} {}", module.qualified_method_name(call.method))
        }
        Instr::FieldOrNew(init) => {
            let def = &module.fields[init.field];
            writeln!(
                f,
                "{pad}field_or_new {}::{} via {}",
                module.types[def.declaring].name,
                def.name,
                module.qualified_method_name(init.ctor)
            )
        }
        Instr::IfNotNull(region) => {
            writeln!(f, "{pad}if_not_null {{")?;
            for inner in region {
                write_instr(f, module, inner, indent + 1)?;
            }
            writeln!(f, "{pad}}}")
        }
    }
}

/// Renders one method as a readable signature plus indented body listing.
pub struct MethodDisplay<'a> {
    module: &'a Module,
    method: MethodKey,
}

impl std::fmt::Display for MethodDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let def = &self.module.methods[self.method];
        write!(f, "fn {}(", self.module.qualified_method_name(self.method))?;
        for (index, param) in def.params.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", param.name, param.ty.display(self.module))?;
        }
        write!(f, ")")?;
        if let Some(ret) = &def.return_type {
            write!(f, " -> {}", ret.display(self.module))?;
        }
        if def.is_abstract() {
            return writeln!(f, ";");
        }
        writeln!(f, " {{")?;
        for instr in &def.body {
            write_instr(f, self.module, instr, 1)?;
        }
        writeln!(f, "}}")
    }
}

impl Module {
    pub fn display_method(&self, method: MethodKey) -> MethodDisplay<'_> {
        MethodDisplay {
            module: self,
            method,
        }
    }
}
