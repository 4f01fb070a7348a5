use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Reserved name for the built-in system agent. It has no backing process
/// and is exempt from every liveness check.
pub const CREATOR_NAME: &str = "the_creator";

const ADJECTIVES: &[&str] = &[
    "amber", "atomic", "bold", "brave", "breezy", "bright", "clever", "cosmic", "crafty", "crimson",
    "curious", "daring", "dashing", "eager", "electric", "feisty", "fierce", "fluffy", "frosty",
    "fuzzy", "gentle", "giddy", "glossy", "golden", "groovy", "grumpy", "happy", "hasty", "hazel",
    "humble", "jazzy", "jolly", "keen", "lively", "lucky", "lunar", "mellow", "mighty", "nimble",
    "noble", "peppy", "perky", "plucky", "polar", "proud", "quirky", "rapid", "rusty", "sassy",
    "shiny", "sleek", "sly", "snappy", "sneaky", "solar", "speedy", "spicy", "stellar", "stormy",
    "sunny", "swift", "turbo", "velvet", "vivid", "wandering", "whimsical", "wild", "witty",
    "zany", "zesty",
];

const ANIMALS: &[&str] = &[
    "alpaca", "badger", "bat", "beaver", "bison", "bobcat", "camel", "capybara", "cheetah",
    "chinchilla", "cobra", "condor", "coyote", "crane", "dingo", "dolphin", "falcon", "ferret",
    "finch", "flamingo", "fox", "gazelle", "gecko", "gibbon", "hawk", "hedgehog", "heron",
    "ibex", "iguana", "jackal", "jaguar", "kestrel", "koala", "lemur", "leopard", "llama",
    "lynx", "magpie", "manatee", "marmot", "meerkat", "mongoose", "moose", "narwhal", "newt",
    "ocelot", "octopus", "orca", "osprey", "otter", "owl", "panda", "pangolin", "panther",
    "pelican", "penguin", "pigeon", "platypus", "puffin", "quokka", "raccoon", "raven",
    "salamander", "seal", "sparrow", "stork", "tapir", "toucan", "viper", "walrus", "wombat",
    "zebra",
];

/// Deterministic adjective-animal name from a seed string.
pub fn generate_name(seed: &str) -> String {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    let h = hasher.finish();

    let adjective = ADJECTIVES[(h % ADJECTIVES.len() as u64) as usize];
    let animal = ANIMALS[((h / ADJECTIVES.len() as u64) % ANIMALS.len() as u64) as usize];
    format!("{}-{}", adjective, animal)
}

/// Fresh name for a new registration. The seed mixes project, agent type,
/// random entropy, and a retry counter so collisions can be rolled past.
pub fn generate_unique_name(project_name: &str, agent_type: &str, attempt: u32) -> String {
    let entropy: u64 = rand::thread_rng().r#gen();
    generate_name(&format!(
        "{}:{}:{}:{}",
        project_name, agent_type, entropy, attempt
    ))
}
