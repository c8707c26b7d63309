//! Property-based tests for seed assembly

use super::*;
use crate::llm::Role;
use proptest::prelude::*;

fn arb_field() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "[a-zA-Z ]{1,30}"]
}

fn arb_persona() -> impl Strategy<Value = PersonaConfig> {
    (arb_field(), arb_field(), arb_field(), arb_field(), arb_field()).prop_map(
        |(description, personality, scenario, user_persona, first_message)| PersonaConfig {
            description,
            personality,
            scenario,
            user_persona,
            first_message,
            ..PersonaConfig::default()
        },
    )
}

/// Position of each label in the fixed order
fn rank(content: &str) -> usize {
    [
        "Character Description: ",
        "Personality: ",
        "Scenario: ",
        "User Persona: ",
    ]
    .iter()
    .position(|label| content.starts_with(label))
    .unwrap_or(4)
}

proptest! {
    #[test]
    fn seed_length_counts_non_empty_fields(persona in arb_persona()) {
        let expected = [
            &persona.description,
            &persona.personality,
            &persona.scenario,
            &persona.user_persona,
            &persona.first_message,
        ]
        .iter()
        .filter(|f| !f.is_empty())
        .count();
        prop_assert_eq!(build_context(&persona).len(), expected);
    }

    #[test]
    fn seed_preserves_field_order(persona in arb_persona()) {
        let seed = build_context(&persona);
        let ranks: Vec<usize> = seed
            .iter()
            .map(|m| if m.role == Role::Assistant { 4 } else { rank(&m.content) })
            .collect();
        prop_assert!(ranks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn only_first_message_is_assistant(persona in arb_persona()) {
        let seed = build_context(&persona);
        for (i, message) in seed.iter().enumerate() {
            if message.role == Role::Assistant {
                prop_assert_eq!(i, seed.len() - 1);
                prop_assert_eq!(&message.content, &persona.first_message);
            } else {
                prop_assert_eq!(message.role, Role::System);
            }
        }
    }

    #[test]
    fn build_is_deterministic(persona in arb_persona()) {
        prop_assert_eq!(build_context(&persona), build_context(&persona));
    }
}
