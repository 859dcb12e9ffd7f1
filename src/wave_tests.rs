//! Wave propagation and pruning properties: uniqueness, monotonic wave
//! growth, the pruning fixed point, lexical shadowing, and idempotent
//! re-propagation.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::builder::IRBuilder;
    use crate::ir::{BlockKind, Dependency, ExprSource, IRStmt, PropsSource, ERR_MISSING_WAVE_BIT};
    use crate::wave::build_wave_bits_map;

    fn component(name: &str) -> IRBuilder {
        IRBuilder::new(name, BlockKind::Component, "test.tsx")
    }

    fn expr(code: &str) -> ExprSource {
        ExprSource::new(code)
    }

    fn explicit(bitmap: u64, names: &[&str]) -> Dependency {
        Dependency {
            dep_id_bitmap: bitmap,
            source_names: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_every_live_id_is_a_distinct_power_of_two() {
        let mut builder = component("App");
        builder.add_state(&expr("a"), Some(expr("1"))).unwrap();
        builder.add_state(&expr("{ b, c }"), None).unwrap();
        builder.add_state(&expr("d"), Some(expr("a + b"))).unwrap();
        builder
            .add_watch(expr("() => log(a, b, d)"), None)
            .unwrap();
        let (ir, _) = builder.build().unwrap();

        let map = &ir.block(ir.root).reactive_map;
        for (name, &id) in map {
            assert!(id.is_power_of_two(), "{} has non-power-of-two id {}", name, id);
        }
        // Only the destructured pair shares a bit.
        assert_eq!(map["b"], map["c"]);
        assert_ne!(map["a"], map["b"]);
        assert_ne!(map["a"], map["d"]);
    }

    // Scenario from the wave algorithm: state count (0b1), derived
    // double = count * 2 (0b10), watch on double. The watch's bit settles on
    // double's canonical bit, and count inherits it through the chain.
    #[test]
    fn test_state_derived_watch_wave_bits() {
        let mut builder = component("Counter");
        builder.add_state(&expr("count"), Some(expr("0"))).unwrap();
        builder
            .add_state(&expr("double"), Some(expr("count * 2")))
            .unwrap();
        builder
            .add_watch(expr("() => log(double)"), Some(explicit(0b10, &["double"])))
            .unwrap();
        let (_, manager) = builder.build().unwrap();

        let expected: HashMap<u64, u64> = [(0b1, 0b10), (0b10, 0b10)].into_iter().collect();
        assert_eq!(manager.wave_bits_map(), &expected);
        assert_eq!(manager.id_to_wave_bit().get(&0b10), Some(&0b10));
        assert!(!manager.id_to_wave_bit().contains_key(&0b1));
    }

    #[test]
    fn test_monotonic_wave_growth_through_chain() {
        let mut builder = component("Chain");
        builder.add_state(&expr("a"), Some(expr("1"))).unwrap();
        builder.add_state(&expr("b"), Some(expr("a + 1"))).unwrap();
        builder.add_state(&expr("c"), Some(expr("b + 1"))).unwrap();
        builder.add_watch(expr("() => log(c)"), None).unwrap();
        builder.set_view(&expr("<div>{b}</div>")).unwrap();
        let (_, manager) = builder.build().unwrap();

        let wave_a = manager.wave_bits_for_id(0b1);
        let wave_b = manager.wave_bits_for_id(0b10);
        let wave_c = manager.wave_bits_for_id(0b100);
        // Changing a must reach everything b and c reach.
        assert_eq!(wave_b & wave_a, wave_b);
        assert_eq!(wave_c & wave_b, wave_c);
        // b is observed by the view (own bit) and by c's watch chain.
        assert_eq!(wave_b, 0b110);
        assert_eq!(wave_a, 0b110);
        assert_eq!(wave_c, 0b100);
    }

    #[test]
    fn test_unobserved_state_is_pruned_from_both_maps() {
        let mut builder = component("App");
        builder.add_state(&expr("used"), Some(expr("1"))).unwrap();
        builder.add_state(&expr("dead"), Some(expr("2"))).unwrap();
        builder.set_view(&expr("<div>{used}</div>")).unwrap();
        let (ir, manager) = builder.build().unwrap();

        assert!(!manager.wave_bits_map().contains_key(&0b10));
        assert!(!manager.id_to_wave_bit().contains_key(&0b10));
        let body = &ir.block(ir.root).body;
        assert_eq!(body.len(), 2);
        assert!(matches!(&body[0], IRStmt::State(s) if s.names == ["used"]));
    }

    #[test]
    fn test_pruning_reaches_fixed_point_through_derived_chain() {
        let mut builder = component("App");
        builder.add_state(&expr("s"), Some(expr("1"))).unwrap();
        builder.add_state(&expr("d1"), Some(expr("s * 2"))).unwrap();
        builder.add_state(&expr("d2"), Some(expr("d1 * 2"))).unwrap();
        builder.add_state(&expr("kept"), Some(expr("3"))).unwrap();
        builder.set_view(&expr("<div>{kept}</div>")).unwrap();
        let (ir, manager) = builder.build().unwrap();

        // d2 is dead, which strands d1, which strands s.
        let body = &ir.block(ir.root).body;
        assert_eq!(body.len(), 2);
        assert!(matches!(&body[0], IRStmt::State(s) if s.names == ["kept"]));
        for dead in [0b1u64, 0b10, 0b100] {
            assert!(!manager.wave_bits_map().contains_key(&dead));
            assert!(!manager.id_to_wave_bit().contains_key(&dead));
        }
        assert_eq!(manager.wave_bits_for_id(0b1000), 0b1000);
    }

    #[test]
    fn test_partially_used_destructured_prop_survives_whole() {
        let mut builder = component("Point");
        builder
            .add_single_prop("value", &expr("{ x, y }"), PropsSource::Param, None)
            .unwrap();
        builder.set_view(&expr("<b>{x}</b>")).unwrap();
        let (ir, manager) = builder.build().unwrap();

        // Only x is read, but the shared id survives undivided.
        assert_eq!(manager.id_to_wave_bit().get(&0b1), Some(&0b1));
        assert!(matches!(&ir.block(ir.root).body[0], IRStmt::SingleProp(_)));
    }

    #[test]
    fn test_react_bits_for_unknown_id_is_internal_error() {
        let mut builder = component("App");
        builder.add_state(&expr("a"), Some(expr("1"))).unwrap();
        builder.set_view(&expr("<div>{a}</div>")).unwrap();
        let (_, manager) = builder.build().unwrap();

        assert_eq!(manager.react_bits_for_dependency(0b1).unwrap(), 0b1);
        let err = manager.react_bits_for_dependency(0b1000).unwrap_err();
        assert_eq!(err.code, ERR_MISSING_WAVE_BIT);
        assert!(err.is_internal());
    }

    #[test]
    fn test_lexical_shadowing_resolves_to_nearest_scope() {
        let mut builder = component("Outer");
        builder.add_state(&expr("count"), Some(expr("0"))).unwrap();
        builder.start_sub_component("Inner").unwrap();
        builder.add_state(&expr("count"), Some(expr("100"))).unwrap();
        assert_eq!(builder.global_reactive_map()["count"], 0b10);
        builder.set_view(&expr("<p>{count}</p>")).unwrap();
        builder.end_sub_component().unwrap();
        builder.set_view(&expr("<div>{count}</div>")).unwrap();
        let (ir, manager) = builder.build().unwrap();

        // The inner view observes the inner id, the outer view the outer id.
        let inner_block = 1;
        assert_eq!(ir.resolve_reactive(inner_block, "count"), Some(0b10));
        assert_eq!(ir.resolve_reactive(ir.root, "count"), Some(0b1));
        assert_eq!(manager.wave_bits_for_name(&ir, inner_block, "count"), 0b10);
        assert_eq!(manager.wave_bits_for_name(&ir, ir.root, "count"), 0b1);
        assert_eq!(manager.wave_bits_for_name(&ir, ir.root, "missing"), 0);
    }

    #[test]
    fn test_parent_state_inherits_waves_from_nested_component() {
        let mut builder = component("Outer");
        builder.add_state(&expr("base"), Some(expr("1"))).unwrap();
        builder.start_sub_component("Inner").unwrap();
        builder
            .add_state(&expr("scaled"), Some(expr("base * 10")))
            .unwrap();
        builder.add_watch(expr("() => log(scaled)"), None).unwrap();
        builder.end_sub_component().unwrap();
        let (_, manager) = builder.build().unwrap();

        // scaled lives in the child scope; base must still carry its wave.
        assert_eq!(manager.wave_bits_for_id(0b10), 0b10);
        assert_eq!(manager.wave_bits_for_id(0b1), 0b10);
    }

    #[test]
    fn test_repropagation_is_idempotent() {
        let mut builder = component("App");
        builder.add_state(&expr("a"), Some(expr("1"))).unwrap();
        builder.add_state(&expr("b"), Some(expr("a + 1"))).unwrap();
        builder.add_state(&expr("c"), Some(expr("a + b"))).unwrap();
        builder.add_watch(expr("() => log(b, c)"), None).unwrap();
        builder.set_view(&expr("<div>{c}</div>")).unwrap();
        let (ir, manager) = builder.build().unwrap();

        let again = build_wave_bits_map(&ir, manager.id_to_wave_bit());
        assert_eq!(&again, manager.wave_bits_map());
        let once_more = build_wave_bits_map(&ir, manager.id_to_wave_bit());
        assert_eq!(once_more, again);
    }

    #[test]
    fn test_hook_argument_dependencies_are_terminal() {
        let mut builder = component("Search");
        builder.add_state(&expr("query"), Some(expr("''"))).unwrap();
        builder
            .add_state(&expr("results"), Some(expr("useSearch(query)")))
            .unwrap();
        builder.set_view(&expr("<ul>{results}</ul>")).unwrap();
        let (_, manager) = builder.build().unwrap();

        // The hook call observes query directly: its update guard needs a
        // react bit for it.
        assert_eq!(manager.id_to_wave_bit().get(&0b1), Some(&0b1));
        assert_eq!(manager.react_bits_for_dependency(0b1).unwrap(), 0b1);
        // query's wave includes both its own bit and the hook's.
        assert_eq!(manager.wave_bits_for_id(0b1), 0b11);
    }

    #[test]
    fn test_watch_without_reactive_reads_keeps_nothing_alive() {
        let mut builder = component("App");
        builder.add_state(&expr("a"), Some(expr("1"))).unwrap();
        builder
            .add_watch(expr("() => tick()"), None)
            .unwrap();
        let (ir, manager) = builder.build().unwrap();

        assert!(manager.wave_bits_map().is_empty());
        // The watch itself survives; only the unread state is gone.
        let body = &ir.block(ir.root).body;
        assert_eq!(body.len(), 1);
        assert!(matches!(&body[0], IRStmt::Watch(_)));
    }
}
