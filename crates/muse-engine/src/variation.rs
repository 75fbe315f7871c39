use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

/// One of the three independent modifier-phrase pools used to diversify a
/// batch of prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariationDimension {
    Environmental,
    Compositional,
    Stylistic,
}

impl VariationDimension {
    pub fn pool(&self) -> &'static [&'static str] {
        match self {
            VariationDimension::Environmental => ENVIRONMENTAL,
            VariationDimension::Compositional => COMPOSITIONAL,
            VariationDimension::Stylistic => STYLISTIC,
        }
    }
}

const ENVIRONMENTAL: &[&str] = &[
    "in golden hour lighting",
    "with dramatic, controlled studio lighting",
    "on an overcast day with soft, diffused light",
    "in a neon-lit urban environment at night",
    "under a harsh desert sun with strong shadows",
    "on a misty forest morning with ethereal light",
    "during a vibrant sunset",
    "in a moody, rain-slicked setting",
    "under the soft glow of twilight",
];

const COMPOSITIONAL: &[&str] = &[
    "as a close-up portrait with a shallow depth of field",
    "as a wide-angle environmental shot showing the full context",
    "from a low-angle hero shot, looking powerful",
    "from a high-angle bird's eye perspective",
    "with a dutch angle for a dynamic feel",
    "in a perfectly symmetrical and centered composition",
    "framed through a window or doorway",
    "using the rule of thirds",
    "as a cinematic wide shot",
];

const STYLISTIC: &[&str] = &[
    "in a photorealistic style with a film photography aesthetic",
    "in a clean, modern digital art illustration style",
    "with the texture and feel of a classical oil painting",
    "in a comic book style with bold colors and ink lines",
    "in a high-contrast, noir black and white style",
    "with the soft, flowing aesthetic of a watercolor painting",
    "in a vibrant, synthwave art style",
    "as a piece of minimalist vector art",
    "in a gritty, textured, grunge style",
];

/// Expands one base prompt into `count` diverse prompt strings.
///
/// For `count <= 1` the base prompt comes back verbatim. Otherwise each
/// output appends two modifiers drawn from two different dimensions:
/// `"<base>, <modifier1>, <modifier2>."`. Dimension pairing is balanced
/// across the batch by shuffling a pool holding each dimension tag `count`
/// times; modifiers avoid batch-wide repeats via bounded rejection sampling,
/// so diversity is best-effort once a pool runs dry, not a hard guarantee.
pub fn generate_diverse_prompts(base_prompt: &str, count: usize) -> Vec<String> {
    if count <= 1 {
        return vec![base_prompt.to_string()];
    }

    let mut rng = rand::rng();
    let mut used: HashSet<&'static str> = HashSet::new();
    let mut prompts = Vec::with_capacity(count);

    let mut dimension_pool = Vec::with_capacity(count * 3);
    for _ in 0..count {
        dimension_pool.push(VariationDimension::Environmental);
        dimension_pool.push(VariationDimension::Compositional);
        dimension_pool.push(VariationDimension::Stylistic);
    }
    dimension_pool.shuffle(&mut rng);

    for _ in 0..count {
        let first = dimension_pool
            .pop()
            .unwrap_or(VariationDimension::Compositional);
        let second = pop_distinct(&mut dimension_pool, first);
        let modifier1 = pick_unused_modifier(first, &mut used, &mut rng);
        let modifier2 = pick_unused_modifier(second, &mut used, &mut rng);
        prompts.push(format!("{base_prompt}, {modifier1}, {modifier2}."));
    }

    prompts
}

/// Takes the last pooled dimension differing from `first`, so the two
/// modifiers of one prompt never come from the same pool.
fn pop_distinct(
    pool: &mut Vec<VariationDimension>,
    first: VariationDimension,
) -> VariationDimension {
    if let Some(position) = pool.iter().rposition(|dimension| *dimension != first) {
        return pool.remove(position);
    }
    if first == VariationDimension::Stylistic {
        VariationDimension::Compositional
    } else {
        VariationDimension::Stylistic
    }
}

fn pick_unused_modifier(
    dimension: VariationDimension,
    used: &mut HashSet<&'static str>,
    rng: &mut impl Rng,
) -> &'static str {
    let pool = dimension.pool();
    let mut modifier = pool[rng.random_range(0..pool.len())];
    let mut attempts = 1;
    // Bounded: once the pool is effectively exhausted, repeats are allowed.
    while used.contains(modifier) && attempts < pool.len() * 2 {
        modifier = pool[rng.random_range(0..pool.len())];
        attempts += 1;
    }
    used.insert(modifier);
    modifier
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owning_dimension(modifier: &str) -> Option<VariationDimension> {
        [
            VariationDimension::Environmental,
            VariationDimension::Compositional,
            VariationDimension::Stylistic,
        ]
        .into_iter()
        .find(|dimension| dimension.pool().contains(&modifier))
    }

    /// Splits `"<modifier1>, <modifier2>"` back into known pool phrases.
    /// Plain `split(", ")` would break on phrases with internal commas.
    fn split_modifiers(tail: &str) -> Option<(&'static str, &'static str)> {
        let all: Vec<&'static str> = [ENVIRONMENTAL, COMPOSITIONAL, STYLISTIC]
            .into_iter()
            .flatten()
            .copied()
            .collect();
        for &first in &all {
            if let Some(rest) = tail
                .strip_prefix(first)
                .and_then(|rest| rest.strip_prefix(", "))
            {
                if let Some(&second) = all.iter().find(|phrase| **phrase == rest) {
                    return Some((first, second));
                }
            }
        }
        None
    }

    #[test]
    fn count_of_one_or_less_returns_base_prompt_untouched() {
        assert_eq!(generate_diverse_prompts("a knight", 1), vec!["a knight"]);
        assert_eq!(generate_diverse_prompts("a knight", 0), vec!["a knight"]);
    }

    #[test]
    fn outputs_carry_base_prefix_and_two_modifier_clauses() {
        let base = "a knight resting by a campfire";
        let prompts = generate_diverse_prompts(base, 4);
        assert_eq!(prompts.len(), 4);
        for prompt in &prompts {
            assert!(prompt.starts_with(&format!("{base}, ")), "{prompt}");
            assert!(prompt.ends_with('.'), "{prompt}");
            let tail = prompt
                .strip_prefix(&format!("{base}, "))
                .and_then(|rest| rest.strip_suffix('.'))
                .unwrap();
            assert!(split_modifiers(tail).is_some(), "{prompt}");
        }
    }

    #[test]
    fn modifiers_within_one_prompt_come_from_different_pools() {
        let base = "a knight";
        for prompt in generate_diverse_prompts(base, 6) {
            let tail = prompt
                .strip_prefix(&format!("{base}, "))
                .and_then(|rest| rest.strip_suffix('.'))
                .unwrap();
            let (modifier1, modifier2) =
                split_modifiers(tail).expect("both clauses are known modifiers");
            let first = owning_dimension(modifier1).unwrap();
            let second = owning_dimension(modifier2).unwrap();
            assert_ne!(first, second, "{prompt}");
        }
    }

    #[test]
    fn four_variations_are_pairwise_distinct_with_fresh_pools() {
        let prompts = generate_diverse_prompts("a knight", 4);
        for (index, left) in prompts.iter().enumerate() {
            for right in prompts.iter().skip(index + 1) {
                assert_ne!(left, right);
            }
        }
    }

    #[test]
    fn pool_exhaustion_permits_repeats_instead_of_spinning() {
        // 30 prompts need 60 modifiers from 27 phrases; must still terminate.
        let prompts = generate_diverse_prompts("a knight", 30);
        assert_eq!(prompts.len(), 30);
    }
}
