//! Property tests: markup reconstruction and form cardinality

use markup_tailor::{compile, Context, Value};
use proptest::prelude::*;

// -- Strategy helpers --

fn arb_piece() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z ;\n]{0,12}",
        Just("{+name+}".to_string()),
        Just("{+name|fallback+}".to_string()),
        Just("{+((1 + 2))+}".to_string()),
        Just("{- hidden -}".to_string()),
        Just("{-multi\nline-}".to_string()),
        Just("{##stat:1##}".to_string()),
        Just("{#inst:2#}".to_string()),
        Just("{@key:value@}".to_string()),
        Just("{{+:{+item+}, +}}".to_string()),
        Just("{+?name:yes+}".to_string()),
    ]
}

fn arb_markup() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_piece(), 0..16).prop_map(|pieces| pieces.concat())
}

fn arb_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,4}", 0..6)
}

proptest! {
    #[test]
    fn markup_round_trips(markup in arb_markup()) {
        let dom = compile(&markup).unwrap();
        prop_assert_eq!(dom.markup(), markup);
    }

    #[test]
    fn rendering_is_repeatable(markup in arb_markup(), items in arb_list()) {
        let dom = compile(&markup).unwrap();
        let first = dom.tailor(&mut Context::new().with("item", items.clone())).unwrap();
        let second = dom.tailor(&mut Context::new().with("item", items)).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Cardinality is the longest list; shorter optional lists render blank
    #[test]
    fn form_cardinality_is_max_length(a in arb_list(), b in arb_list()) {
        let dom = compile("{{+:{+a+}={+b+}<<+;>>+}}").unwrap();
        let mut ctx = Context::new()
            .with("a", Value::from(a.clone()))
            .with("b", Value::from(b.clone()));
        let out = dom.tailor(&mut ctx).unwrap();
        prop_assert_eq!(out.matches(';').count(), a.len().max(b.len()));
    }
}
