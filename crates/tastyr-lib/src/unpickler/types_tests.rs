//! Type-grammar reading: bounds, lambdas, refinements, recursion, refusals.

use std::rc::Rc;

use tastyr_core::bytes::Addr;
use tastyr_core::tags::Tag;
use tastyr_core::UnpickleError;

use crate::host::symbols::{Space, SymbolKind};
use crate::host::types::{LambdaKind, Type};
use crate::test_support::{Pickler, demo_owner, fresh_env, make_roots};

fn scala_ref(p: &mut Pickler, member: &str) {
    let m = p.utf8(member);
    let scala = p.path("scala");
    p.type_ref_in_pkg(m, scala);
}

/// Unpickle one `package demo { ... }` stream; return env, unpickler.
fn unpickle(p: Pickler) -> (Rc<crate::host::HostEnv>, Rc<crate::Unpickler>) {
    let env = fresh_env();
    let owner = demo_owner(&env);
    let (class_root, module_root) = make_roots(&env, owner, "Root");
    let u = p.into_unpickler(Rc::clone(&env), "demo.tasty");
    u.enter_top_level(class_root, module_root).unwrap();
    (env, u)
}

fn info_at(
    env: &crate::host::HostEnv,
    u: &Rc<crate::Unpickler>,
    addr: Addr,
) -> tastyr_core::Result<Type> {
    let sym = u.symbol_at_addr(addr).expect("definition indexed");
    env.symtab.info(sym)
}

#[test]
fn higher_kinded_bound_reads_as_lambda_upper_bound() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let f = p.utf8("F");
    let x = p.utf8("X");
    let mut addr = None;
    p.package(demo, |p| {
        addr = Some(p.def(Tag::TypeDef, f, |p| {
            let bounds = p.begin(Tag::TypeBoundsTpt);
            scala_ref(p, "Nothing");
            let lambda = p.begin(Tag::LambdaTpt);
            p.def(Tag::TypeParam, x, |p| {
                let xb = p.begin(Tag::TypeBoundsTpt);
                scala_ref(p, "Nothing");
                scala_ref(p, "Any");
                p.end(xb);
            });
            scala_ref(p, "Any");
            p.end(lambda);
            p.end(bounds);
        }));
    });

    let (env, u) = unpickle(p);
    let info = info_at(&env, &u, addr.unwrap()).unwrap();
    let Type::Bounds { lo, hi } = info else {
        panic!("expected bounds, got {info:?}");
    };
    assert!(matches!(
        *lo,
        Type::TypeRef { sym, .. } if sym == env.mirror.nothing_class()
    ));
    let Type::Lambda(lambda) = *hi else {
        panic!("upper bound must be a type lambda");
    };
    assert_eq!(lambda.kind, LambdaKind::TypeLambda);
    assert_eq!(&*lambda.param_names()[0], "X");
    assert!(matches!(lambda.param_infos()[0], Type::Bounds { .. }));
}

#[test]
fn alias_bounds_collapse_to_the_alias() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let a = p.utf8("A");
    let mut addr = None;
    p.package(demo, |p| {
        addr = Some(p.def(Tag::TypeDef, a, |p| {
            // Bounds with an absent high side denote an alias.
            let bounds = p.begin(Tag::TypeBoundsTpt);
            scala_ref(p, "Int");
            p.end(bounds);
        }));
    });

    let (env, u) = unpickle(p);
    let info = info_at(&env, &u, addr.unwrap()).unwrap();
    assert!(
        matches!(info, Type::TypeRef { sym, .. }
            if env.symtab.ident(sym).as_ref() == "Int"),
        "alias collapsed, got {info:?}"
    );
}

#[test]
fn nested_refinements_flatten_into_one_scope() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let r = p.utf8("R");
    let x = p.utf8("x");
    let y = p.utf8("y");
    let object_name = p.utf8("Object");
    let java_lang = p.path("java.lang");
    let mut addr = None;
    p.package(demo, |p| {
        addr = Some(p.def(Tag::TypeDef, r, |p| {
            let outer = p.begin(Tag::RefinedType);
            p.nat(y as u64);
            {
                let inner = p.begin(Tag::RefinedType);
                p.nat(x as u64);
                p.type_ref_in_pkg(object_name, java_lang);
                scala_ref(p, "Int"); // member x: Int
                p.end(inner);
            }
            scala_ref(p, "Long"); // member y: Long
            p.end(outer);
        }));
    });

    let (env, u) = unpickle(p);
    let info = info_at(&env, &u, addr.unwrap()).unwrap();
    let Type::Refined {
        parents,
        decls,
        cls,
    } = info
    else {
        panic!("expected a refined type, got {info:?}");
    };
    assert_eq!(env.symtab.kind(cls), SymbolKind::RefinementClass);
    // One scope holds both members; parents come from the innermost.
    assert_eq!(decls.len(), 2);
    assert!(decls.lookup("x", Space::Term).is_some());
    assert!(decls.lookup("y", Space::Term).is_some());
    assert_eq!(parents.len(), 1);
    assert!(
        matches!(&parents[0], Type::TypeRef { sym, .. } if *sym == env.mirror.object_class())
    );
}

#[test]
fn recursive_type_self_reference_is_the_seeded_node() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let a = p.utf8("A");
    let x = p.utf8("x");
    let object_name = p.utf8("Object");
    let java_lang = p.path("java.lang");
    let mut def_addr = None;
    let mut rec_addr = None;
    p.package(demo, |p| {
        def_addr = Some(p.def(Tag::TypeDef, a, |p| {
            rec_addr = Some(p.pos());
            p.tag(Tag::RecType);
            let refined = p.begin(Tag::RefinedType);
            p.nat(x as u64);
            p.type_ref_in_pkg(object_name, java_lang);
            p.tag(Tag::RecThis);
            p.nat(rec_addr.unwrap().0 as u64);
            p.end(refined);
        }));
    });

    let (env, u) = unpickle(p);
    let info = info_at(&env, &u, def_addr.unwrap()).unwrap();
    let Type::Rec(rec) = info else {
        panic!("expected a recursive type, got {info:?}");
    };
    let Type::Refined { decls, .. } = rec.body() else {
        panic!("recursive body must be the refinement");
    };
    let member = decls.lookup("x", Space::Term).unwrap();
    let member_info = env.symtab.info(member).unwrap();
    // The self-reference resolved to the very node that was seeded.
    assert_eq!(member_info, Type::RecThis(rec));
}

#[test]
fn type_lambda_parameter_references_resolve_through_the_binder() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let l = p.utf8("L");
    let x = p.utf8("X");
    let mut addr = None;
    let mut lambda_addr = None;
    p.package(demo, |p| {
        addr = Some(p.def(Tag::TypeDef, l, |p| {
            lambda_addr = Some(p.pos());
            let lam = p.begin(Tag::TypeLambdaType);
            // Result first: a reference to parameter 0.
            {
                let pref = p.begin(Tag::ParamType);
                p.nat(lambda_addr.unwrap().0 as u64);
                p.nat(0);
                p.end(pref);
            }
            // Then the interleaved (name, bounds) pairs.
            p.nat(x as u64);
            {
                let b = p.begin(Tag::TypeBounds);
                scala_ref(p, "Nothing");
                scala_ref(p, "Any");
                p.end(b);
            }
            p.end(lam);
        }));
    });

    let (env, u) = unpickle(p);
    let info = info_at(&env, &u, addr.unwrap()).unwrap();
    let Type::Lambda(lambda) = info else {
        panic!("expected a lambda, got {info:?}");
    };
    assert_eq!(lambda.arity(), 1);
    assert_eq!(&*lambda.param_names()[0], "X");
    let res = lambda.res_type();
    assert_eq!(
        res,
        Type::ParamRef {
            binder: Rc::clone(&lambda),
            index: 0
        }
    );
}

#[test]
fn shared_types_are_memoized() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let s1 = p.utf8("S1");
    let s2 = p.utf8("S2");
    let mut a1 = None;
    let mut a2 = None;
    let mut shared_target = None;
    p.package(demo, |p| {
        a1 = Some(p.def(Tag::TypeDef, s1, |p| {
            shared_target = Some(p.pos());
            scala_ref(p, "Int");
        }));
        a2 = Some(p.def(Tag::TypeDef, s2, |p| {
            p.tag(Tag::SharedType);
            p.nat(shared_target.unwrap().0 as u64);
        }));
    });

    let (env, u) = unpickle(p);
    let i1 = info_at(&env, &u, a1.unwrap()).unwrap();
    let i2 = info_at(&env, &u, a2.unwrap()).unwrap();
    assert_eq!(i1, i2);
}

#[test]
fn union_types_are_refused_with_a_location() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let uu = p.utf8("U");
    let mut addr = None;
    p.package(demo, |p| {
        addr = Some(p.def(Tag::TypeDef, uu, |p| {
            let or = p.begin(Tag::OrType);
            scala_ref(p, "Int");
            scala_ref(p, "Long");
            p.end(or);
        }));
    });

    let (env, u) = unpickle(p);
    let err = info_at(&env, &u, addr.unwrap()).unwrap_err();
    let UnpickleError::Unsupported {
        construct,
        location,
    } = &err
    else {
        panic!("expected the unsupported kind, got {err}");
    };
    assert_eq!(construct, "union type");
    assert!(location.contains("U"), "location names the owner: {location}");
    assert!(err.is_recoverable());
    insta::assert_snapshot!(
        err.to_string(),
        @"unsupported Scala 3 union type; found in type U in package demo in package <root>"
    );

    // The symbol was poisoned with the error type, and a second demand
    // observes it without re-reading.
    let sym = u.symbol_at_addr(addr.unwrap()).unwrap();
    assert_eq!(env.symtab.info(sym).unwrap(), Type::Error);
}

#[test]
fn reserved_constructs_are_a_distinct_error_kind() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let m = p.utf8("M");
    let mut addr = None;
    p.package(demo, |p| {
        addr = Some(p.def(Tag::TypeDef, m, |p| {
            let mt = p.begin(Tag::MatchTpt);
            scala_ref(p, "Int");
            p.end(mt);
        }));
    });

    let (env, u) = unpickle(p);
    let err = info_at(&env, &u, addr.unwrap()).unwrap_err();
    assert!(
        matches!(err, UnpickleError::Reserved { .. }),
        "match type trees are reserved, got {err}"
    );
}

#[test]
fn recoverable_refusals_report_without_aborting() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let uu = p.utf8("U");
    let ok = p.utf8("Ok");
    let mut bad = None;
    let mut good = None;
    p.package(demo, |p| {
        bad = Some(p.def(Tag::TypeDef, uu, |p| {
            let or = p.begin(Tag::OrType);
            scala_ref(p, "Int");
            scala_ref(p, "Long");
            p.end(or);
        }));
        good = Some(p.def(Tag::TypeDef, ok, |p| {
            scala_ref(p, "Int");
        }));
    });

    let (env, u) = unpickle(p);
    let bad_sym = u.symbol_at_addr(bad.unwrap()).unwrap();
    assert!(!u.try_complete(bad_sym).unwrap());
    assert!(env.reporter.has_errors());
    assert_eq!(env.reporter.error_count(), 1);

    // The sibling definition still completes.
    let good_info = info_at(&env, &u, good.unwrap()).unwrap();
    assert!(matches!(good_info, Type::TypeRef { .. }));
}

#[test]
fn erased_modifier_is_refused_per_kind() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let f = p.utf8("f");
    let mut addr = None;
    p.package(demo, |p| {
        addr = Some(p.def(Tag::DefDef, f, |p| {
            p.tag(Tag::UnitConst);
            p.tag(Tag::Erased);
        }));
    });

    let (env, u) = unpickle(p);
    let err = info_at(&env, &u, addr.unwrap()).unwrap_err();
    let UnpickleError::Unsupported { construct, .. } = &err else {
        panic!("expected the unsupported kind, got {err}");
    };
    assert!(
        construct.contains("ERASED"),
        "the refused flag is named: {construct}"
    );
}

#[test]
fn inline_values_need_a_constant_rhs() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let c = p.utf8("c");
    let d = p.utf8("d");
    let mut const_addr = None;
    let mut nonconst_addr = None;
    p.package(demo, |p| {
        const_addr = Some(p.def(Tag::ValDef, c, |p| {
            scala_ref(p, "Int");
            p.tag(Tag::IntConst);
            p.int(42);
            p.tag(Tag::Inline);
        }));
        nonconst_addr = Some(p.def(Tag::ValDef, d, |p| {
            scala_ref(p, "Int");
            p.tag(Tag::Ident);
            p.nat(c as u64);
            scala_ref(p, "Int");
            p.tag(Tag::Inline);
        }));
    });

    let (env, u) = unpickle(p);
    assert!(info_at(&env, &u, const_addr.unwrap()).is_ok());
    let err = info_at(&env, &u, nonconst_addr.unwrap()).unwrap_err();
    assert!(
        matches!(err, UnpickleError::Unsupported { .. }),
        "non-constant inline value refused, got {err}"
    );
}

#[test]
fn applied_type_takes_arguments_in_place_on_a_direct_reference() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let a = p.utf8("A");
    let mut addr = None;
    p.package(demo, |p| {
        addr = Some(p.def(Tag::TypeDef, a, |p| {
            let app = p.begin(Tag::AppliedTpt);
            scala_ref(p, "Int");
            scala_ref(p, "Long");
            p.end(app);
        }));
    });

    let (env, u) = unpickle(p);
    let info = info_at(&env, &u, addr.unwrap()).unwrap();
    let Type::TypeRef { args, .. } = info else {
        panic!("application over a direct reference stays a type ref");
    };
    assert_eq!(args.len(), 1);
}

#[test]
fn intersection_type_collects_all_parts() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let a = p.utf8("A");
    let mut addr = None;
    p.package(demo, |p| {
        addr = Some(p.def(Tag::TypeDef, a, |p| {
            let and = p.begin(Tag::AndType);
            scala_ref(p, "Int");
            scala_ref(p, "Long");
            p.end(and);
        }));
    });

    let (env, u) = unpickle(p);
    let info = info_at(&env, &u, addr.unwrap()).unwrap();
    let Type::Intersection(parts) = info else {
        panic!("expected an intersection, got {info:?}");
    };
    assert_eq!(parts.len(), 2);
}

#[test]
fn protected_qualified_sets_the_access_boundary() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let v = p.utf8("v");
    let mut addr = None;
    p.package(demo, |p| {
        addr = Some(p.def(Tag::ValDef, v, |p| {
            scala_ref(p, "Int");
            p.tag(Tag::ProtectedQualified);
            scala_ref(p, "Any");
        }));
    });

    let (env, u) = unpickle(p);
    let sym = u.symbol_at_addr(addr.unwrap()).unwrap();
    let symtab = &env.symtab;
    assert!(symtab
        .flags(sym)
        .contains(tastyr_core::HostFlags::PROTECTED));
    assert_eq!(symtab.private_within(sym), env.mirror.any_class());
}

#[test]
fn annotations_become_lazy_thunks_unless_disabled() {
    fn build() -> (Pickler, std::cell::Cell<Option<Addr>>) {
        let mut p = Pickler::new();
        let demo = p.path("demo");
        let v = p.utf8("v");
        let addr = std::cell::Cell::new(None);
        let deprecated = p.utf8("deprecated");
        let scala = p.path("scala");
        p.package(demo, |p| {
            addr.set(Some(p.def(Tag::ValDef, v, |p| {
                scala_ref(p, "Int");
                let ann = p.begin(Tag::Annotation);
                p.type_ref_in_pkg(deprecated, scala);
                p.tag(Tag::UnitConst);
                p.end(ann);
            })));
        });
        (p, addr)
    }

    // Thunks are attached by default.
    let (p, addr) = build();
    let env = fresh_env();
    let owner = demo_owner(&env);
    let (class_root, module_root) = make_roots(&env, owner, "Root");
    // The annotation names a class the mirror does not seed.
    let scala_pkg = env
        .mirror
        .get_or_create_package(&env.symtab, &tastyr_core::Name::simple("scala"));
    let scala_cls = env.symtab.module_class(scala_pkg);
    let dep = env.symtab.new_class(
        scala_cls,
        tastyr_core::Name::simple("deprecated"),
        Default::default(),
    );
    env.symtab.set_info(
        dep,
        Type::ClassInfo {
            parents: vec![],
            decls: env.symtab.decls(dep),
            cls: dep,
        },
    );
    env.symtab
        .decls(scala_cls)
        .enter(env.symtab.ident(dep), Space::Type, dep);
    let u = p.into_unpickler(Rc::clone(&env), "demo.tasty");
    u.enter_top_level(class_root, module_root).unwrap();
    let sym = u.symbol_at_addr(addr.get().unwrap()).unwrap();
    let annots = env.symtab.annotations(sym);
    assert_eq!(annots.len(), 1);
    let tree = u.annotation_tree(sym, annots[0]).unwrap();
    assert!(matches!(
        tree,
        crate::host::trees::Tree::Literal(crate::host::types::Constant::Unit)
    ));

    // And dropped entirely under `no_annotations`.
    let (p, addr) = build();
    let env = crate::host::HostEnv::new(crate::Settings {
        debug_tasty: false,
        no_annotations: true,
    });
    let owner = demo_owner(&env);
    let (class_root, module_root) = make_roots(&env, owner, "Root");
    let u = p.into_unpickler(Rc::clone(&env), "demo.tasty");
    u.enter_top_level(class_root, module_root).unwrap();
    let sym = u.symbol_at_addr(addr.get().unwrap()).unwrap();
    assert!(env.symtab.annotations(sym).is_empty());
}

#[test]
fn qualified_reference_resolves_through_the_space_type() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let a = p.utf8("A");
    let int_name = p.utf8("Int");
    let scala = p.path("scala");
    let mut addr = None;
    p.package(demo, |p| {
        addr = Some(p.def(Tag::TypeDef, a, |p| {
            let refin = p.begin(Tag::TypeRefIn);
            p.nat(int_name as u64);
            p.tag(Tag::TypeRefPkg);
            p.nat(scala as u64);
            p.tag(Tag::TypeRefPkg);
            p.nat(scala as u64);
            p.end(refin);
        }));
    });

    let (env, u) = unpickle(p);
    let info = info_at(&env, &u, addr.unwrap()).unwrap();
    assert!(
        matches!(info, Type::TypeRef { sym, .. }
            if env.symtab.ident(sym).as_ref() == "Int"),
        "got {info:?}"
    );
}

#[test]
fn symbols_not_at_definitions_are_wire_errors() {
    let mut p = Pickler::new();
    let demo = p.path("demo");
    let a = p.utf8("A");
    p.package(demo, |p| {
        p.def(Tag::TypeDef, a, |p| {
            scala_ref(p, "Int");
        });
    });

    let (_env, u) = unpickle(p);
    let err = u.force_symbol_at(Addr(2)).unwrap_err();
    assert!(matches!(err, UnpickleError::Format(_)));
}
