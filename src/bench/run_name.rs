//! Human-readable run labels

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "amber", "ancient", "brisk", "bold", "calm", "crimson", "curious", "dapper", "eager", "fading",
    "fierce", "gentle", "gilded", "hollow", "humble", "icy", "jolly", "keen", "lucid", "mellow",
    "misty", "nimble", "noble", "odd", "pale", "proud", "quiet", "rapid", "rusty", "silent",
    "sleek", "solar", "steady", "tidal", "twin", "vivid", "wandering", "wild", "windy", "young",
];

const NOUNS: &[&str] = &[
    "anchor", "badger", "beacon", "brook", "canyon", "cedar", "comet", "coral", "delta", "ember",
    "falcon", "fjord", "forest", "glacier", "harbor", "heron", "island", "kestrel", "lagoon",
    "lantern", "meadow", "mesa", "nebula", "orchid", "otter", "pebble", "pine", "quarry", "raven",
    "reef", "ridge", "sparrow", "summit", "thistle", "tundra", "valley", "willow", "wren", "yarrow",
    "zephyr",
];

/// Pick an `adjective_noun` label
pub fn random_run_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("nameless");
    let noun = NOUNS.choose(rng).copied().unwrap_or("run");
    format!("{}_{}", adjective, noun)
}
