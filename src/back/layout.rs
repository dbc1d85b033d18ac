//! The layout planner.
//!
//! One walk over the checked AST decides where everything lives before any
//! code is emitted: global variables get gp-relative offsets, functions get
//! assembly labels, and every class gets its instance layout and vtable.
//!
//! # Object layout
//!
//! Word 0 of every instance holds the pointer to the class's vtable.  Fields
//! follow at offsets 4, 8, … in declaration order, inherited fields first,
//! so a field keeps its offset in every subclass.
//!
//! # VTables
//!
//! A class starts from its parent's vtable.  An override replaces the label
//! at the inherited slot; a new method appends.  A method therefore keeps
//! its slot index in every subclass, which is what makes dispatch through
//! the table sound.

use crate::common::{id, Id, Map};
use crate::front::ast::*;
use crate::front::ty::Type;
use crate::middle::tac::Location;

/// Word and pointer size for the target.
pub const WORD_SIZE: i32 = 4;

/// A planned global variable.
#[derive(Clone, Debug)]
pub struct GlobalVar {
    pub loc: Location,
    pub ty: Type,
}

/// A planned top-level function.
#[derive(Clone, Debug)]
pub struct FnInfo {
    pub label: Id,
    pub ret: Type,
}

/// A field of a class, by byte offset from the instance base.
#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub offset: i32,
    pub ty: Type,
}

/// A method of a class.
#[derive(Clone, Debug)]
pub struct MethodInfo {
    pub label: Id,
    pub ret: Type,
}

/// Everything the emitter needs to know about one class.
#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub name: Id,
    pub parent: Option<Id>,
    /// All fields, inherited ones included.
    pub fields: Map<Id, FieldInfo>,
    /// All methods, inherited ones included.
    pub methods: Map<Id, MethodInfo>,
    /// Method labels in slot order.
    pub vtable: Vec<Id>,
    /// Instance size in bytes, vtable pointer included.
    pub size: i32,
}

impl ClassInfo {
    /// Byte offset of a method's slot within the vtable.
    pub fn vtable_offset(&self, label: Id) -> i32 {
        let index = self
            .vtable
            .iter()
            .position(|slot| *slot == label)
            .expect("dispatched method should have a vtable slot");
        WORD_SIZE * index as i32
    }
}

/// The result of the planning pass.
#[derive(Debug)]
pub struct Layout {
    pub globals: Map<Id, GlobalVar>,
    pub functions: Map<Id, FnInfo>,
    pub classes: Map<Id, ClassInfo>,
}

impl Layout {
    pub fn plan(program: &Program) -> Layout {
        let mut layout = Layout {
            globals: Map::new(),
            functions: Map::new(),
            classes: Map::new(),
        };

        let mut global_offset = 0;
        for decl in &program.decls {
            match decl {
                Decl::Var(var) => {
                    let loc = Location::gp(var.id.name, global_offset);
                    global_offset += WORD_SIZE;
                    layout.globals.insert(
                        var.id.name,
                        GlobalVar {
                            loc,
                            ty: var.ty.clone(),
                        },
                    );
                }
                Decl::Fn(fun) => {
                    let name = fun.id.name;
                    let label = if name.as_ref() == "main" {
                        name
                    } else {
                        id(&format!("_{name}"))
                    };
                    layout.functions.insert(
                        name,
                        FnInfo {
                            label,
                            ret: fun.ret.clone(),
                        },
                    );
                }
                Decl::Class(_) | Decl::Interface(_) => {}
            }
        }

        let class_decls: Map<Id, &ClassDecl> = program
            .decls
            .iter()
            .filter_map(|decl| match decl {
                Decl::Class(class) => Some((class.id.name, class)),
                _ => None,
            })
            .collect();
        for &class in class_decls.values() {
            plan_class(class, &class_decls, &mut layout.classes);
        }

        layout
    }
}

// Memoized, parent first: a class can only be laid out on top of its
// parent's finished layout.
fn plan_class(class: &ClassDecl, decls: &Map<Id, &ClassDecl>, classes: &mut Map<Id, ClassInfo>) {
    let name = class.id.name;
    if classes.contains_key(&name) {
        return;
    }

    let (mut fields, mut methods, mut vtable) = match &class.extends {
        Some(parent) => {
            let parent_decl = decls
                .get(&parent.name)
                .expect("parent class should be declared");
            plan_class(parent_decl, decls, classes);
            let parent_info = &classes[&parent.name];
            (
                parent_info.fields.clone(),
                parent_info.methods.clone(),
                parent_info.vtable.clone(),
            )
        }
        None => (Map::new(), Map::new(), Vec::new()),
    };

    // Skip the vtable pointer, then the inherited fields.
    let mut offset = WORD_SIZE + fields.len() as i32 * WORD_SIZE;
    for member in &class.members {
        if let Decl::Var(field) = member {
            fields.insert(
                field.id.name,
                FieldInfo {
                    offset,
                    ty: field.ty.clone(),
                },
            );
            offset += WORD_SIZE;
        }
    }

    for member in &class.members {
        if let Decl::Fn(method) = member {
            let label = id(&format!("_{name}.{}", method.id.name));
            if let Some(inherited) = methods.get(&method.id.name) {
                let slot = vtable
                    .iter()
                    .position(|existing| *existing == inherited.label)
                    .expect("inherited method should occupy a vtable slot");
                vtable[slot] = label;
            } else {
                vtable.push(label);
            }
            methods.insert(
                method.id.name,
                MethodInfo {
                    label,
                    ret: method.ret.clone(),
                },
            );
        }
    }

    classes.insert(
        name,
        ClassInfo {
            name,
            parent: class.extends.as_ref().map(|e| e.name),
            fields,
            methods,
            vtable,
            size: offset,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse;

    fn layout_of(source: &str) -> Layout {
        Layout::plan(&parse(source).expect("source should parse"))
    }

    #[test]
    fn globals_get_consecutive_gp_offsets() {
        let layout = layout_of("int a; int b; int c; void main() { }");
        let offsets: Vec<i32> = ["a", "b", "c"]
            .iter()
            .map(|name| layout.globals[&id(name)].loc.offset)
            .collect();
        assert_eq!(offsets, vec![0, 4, 8]);
    }

    #[test]
    fn main_keeps_its_name_and_others_get_an_underscore() {
        let layout = layout_of("void main() { } int helper() { return 1; }");
        assert_eq!(layout.functions[&id("main")].label, id("main"));
        assert_eq!(layout.functions[&id("helper")].label, id("_helper"));
    }

    #[test]
    fn fields_follow_the_vtable_pointer() {
        let layout = layout_of("class A { int x; int y; } void main() { }");
        let a = &layout.classes[&id("A")];
        assert_eq!(a.fields[&id("x")].offset, 4);
        assert_eq!(a.fields[&id("y")].offset, 8);
        assert_eq!(a.size, 12);
    }

    #[test]
    fn inherited_fields_keep_their_offsets() {
        let layout = layout_of(
            "class A { int x; }
             class B extends A { int y; }
             void main() { }",
        );
        let a = &layout.classes[&id("A")];
        let b = &layout.classes[&id("B")];
        assert_eq!(b.fields[&id("x")].offset, a.fields[&id("x")].offset);
        assert_eq!(b.fields[&id("y")].offset, 8);
        assert_eq!(b.size, a.size + 4);
    }

    #[test]
    fn overrides_keep_their_vtable_slot() {
        let layout = layout_of(
            "class A { void f() { } void g() { } }
             class B extends A { void g() { } void h() { } }
             void main() { }",
        );
        let a = &layout.classes[&id("A")];
        let b = &layout.classes[&id("B")];
        assert_eq!(a.vtable, vec![id("_A.f"), id("_A.g")]);
        assert_eq!(b.vtable, vec![id("_A.f"), id("_B.g"), id("_B.h")]);
        assert_eq!(
            a.vtable_offset(id("_A.g")),
            b.vtable_offset(id("_B.g"))
        );
    }

    #[test]
    fn parent_is_planned_before_child_regardless_of_order() {
        let layout = layout_of(
            "class B extends A { int y; }
             class A { int x; }
             void main() { }",
        );
        assert_eq!(layout.classes[&id("B")].fields[&id("x")].offset, 4);
        assert_eq!(layout.classes[&id("B")].fields[&id("y")].offset, 8);
    }
}
