//! Random human-readable identities.
//!
//! Generated ids look like `brave-otters-sing`: an adjective, a plural noun
//! and a verb, lower-case and hyphen separated. Every word list entry is
//! plain ASCII, so any combination passes [`is_valid_identity`].
//!
//! [`is_valid_identity`]: crate::identity::is_valid_identity

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::seq::SliceRandom;

/// Source of candidate identities for tunnels that do not ask for a name.
pub trait IdGenerator: Send + Sync + std::fmt::Debug {
    /// Produce a fresh candidate. Uniqueness is enforced by the registry.
    fn generate(&self) -> String;
}

const ADJECTIVES: &[&str] = &[
    "afraid", "ancient", "angry", "average", "bad", "big", "bitter", "black", "blue", "brave",
    "breezy", "bright", "brown", "calm", "chatty", "chilly", "clever", "cold", "cool", "cozy",
    "crazy", "cuddly", "curly", "cute", "dark", "dirty", "dry", "dull", "eager", "early",
    "easy", "empty", "evil", "fair", "famous", "fancy", "fast", "fat", "few", "fluffy",
    "fresh", "friendly", "funny", "fuzzy", "gentle", "giant", "good", "great", "green", "grumpy",
    "happy", "heavy", "helpful", "honest", "hot", "huge", "humble", "hungry", "icy", "jolly",
    "kind", "large", "lazy", "light", "little", "long", "loud", "lovely", "lucky", "mean",
    "merry", "mighty", "modern", "moody", "neat", "nice", "noisy", "odd", "old", "orange",
    "pink", "plain", "polite", "poor", "proud", "purple", "quick", "quiet", "rare", "red",
    "rich", "rotten", "rude", "sad", "salty", "shaggy", "sharp", "shiny", "short", "shy",
    "silly", "slimy", "slow", "small", "smart", "smooth", "soft", "sour", "spicy", "stale",
    "strong", "sweet", "swift", "tall", "tame", "tasty", "tender", "thick", "thin", "tidy",
    "tiny", "tough", "twenty", "ugly", "violet", "warm", "wet", "white", "wicked", "wide",
    "wild", "wise", "witty", "yellow", "young", "yummy", "zany", "zealous",
];

const NOUNS: &[&str] = &[
    "actors", "ads", "ants", "apes", "apples", "baboons", "badgers", "bananas", "bats", "bears",
    "beds", "bees", "berries", "birds", "boats", "bobcats", "books", "boxes", "buckets", "bugs",
    "buses", "buttons", "camels", "cameras", "candies", "carrots", "cars", "cats", "chefs", "chicken",
    "clocks", "clouds", "coats", "colts", "comics", "cooks", "corners", "cougars", "cows", "crabs",
    "crews", "cups", "days", "deer", "dingos", "dodos", "dogs", "dolls", "donkeys", "doors",
    "dots", "dragons", "drinks", "dryers", "ducks", "eagles", "eels", "eggs", "elephants", "emus",
    "experts", "eyes", "falcons", "fans", "feet", "files", "flies", "foxes", "frogs", "games",
    "garlics", "geckos", "geese", "gifts", "glasses", "goats", "grapes", "guests", "hairs", "hands",
    "hats", "hornets", "horses", "hotels", "hounds", "houses", "humans", "icons", "ideas", "impalas",
    "insects", "islands", "items", "jars", "jeans", "jobs", "jokes", "keys", "kids", "kings",
    "kiwis", "knives", "lamps", "lands", "laws", "lemons", "lies", "lights", "lines", "lions",
    "lizards", "llamas", "mails", "mangos", "maps", "masks", "meals", "melons", "mice", "moles",
    "monkeys", "moons", "moose", "mugs", "news", "nights", "numbers", "olives", "onions", "oranges",
    "otters", "owls", "pans", "pants", "papayas", "parents", "parks", "parrots", "peas", "pens",
    "phones", "pianos", "pigs", "plants", "plums", "poets", "ponies", "pots", "queens", "rabbits",
    "radios", "rats", "ravens", "rings", "roses", "rules", "schools", "seals", "sheep", "shirts",
    "shoes", "signs", "sloths", "snails", "snakes", "socks", "spiders", "spoons", "squids", "stars",
    "states", "steaks", "swans", "symbols", "tables", "taxes", "teams", "teeth", "terms", "things",
    "ties", "tigers", "times", "tips", "toes", "tools", "towns", "toys", "trains", "trees",
    "turkeys", "turtles", "vans", "views", "walls", "wasps", "waves", "ways", "webs", "weeks",
    "windows", "wings", "wolves", "wombats", "words", "worms", "yaks", "years", "zebras", "zoos",
];

const VERBS: &[&str] = &[
    "accept", "act", "add", "admire", "agree", "allow", "appear", "argue", "arrive", "ask",
    "attack", "attend", "bake", "bathe", "battle", "beam", "beg", "begin", "behave", "bet",
    "boil", "bow", "brake", "brush", "build", "burn", "buy", "call", "camp", "care",
    "carry", "change", "cheat", "check", "cheer", "chew", "clap", "clean", "cough", "count",
    "cover", "crash", "cross", "cry", "cut", "dance", "decide", "deny", "design", "dig",
    "divide", "do", "double", "doubt", "draw", "dream", "dress", "drive", "drop", "drum",
    "eat", "end", "enjoy", "enter", "exist", "fail", "fall", "feel", "fetch", "film",
    "find", "fix", "flash", "float", "flow", "fly", "fold", "follow", "fry", "give",
    "glow", "go", "grab", "greet", "grin", "grow", "guess", "hammer", "hang", "happen",
    "heal", "hear", "help", "hide", "hope", "hug", "hunt", "invent", "invite", "itch",
    "jam", "jog", "join", "joke", "judge", "juggle", "jump", "kick", "kiss", "kneel",
    "knock", "know", "laugh", "lay", "lead", "learn", "leave", "lick", "lie", "like",
    "listen", "live", "look", "lose", "love", "make", "marry", "matter", "melt", "mix",
    "move", "nail", "notice", "obey", "occur", "open", "own", "pay", "peel", "play",
    "poke", "post", "press", "prove", "pull", "pump", "punch", "push", "raise", "read",
    "refuse", "relate", "relax", "remain", "repair", "repeat", "reply", "report", "rescue", "rest",
    "retire", "return", "rhyme", "ring", "roll", "rule", "run", "rush", "say", "scream",
    "search", "see", "sell", "send", "serve", "shake", "share", "shave", "shine", "shop",
    "shout", "show", "sin", "sing", "sink", "sip", "sit", "sleep", "slide", "smash",
    "smell", "smile", "sneeze", "sniff", "sort", "speak", "stare", "start", "stay", "stick",
    "stop", "study", "sow", "swim", "switch", "take", "talk", "taste", "teach", "tease",
    "tell", "tickle", "tie", "trade", "train", "travel", "try", "turn", "type", "unite",
    "vanish", "visit", "wait", "walk", "warn", "wash", "watch", "wave", "win", "wink",
    "wish", "wonder", "work", "worry", "write", "yawn", "yell", "zoom",
];

/// Default generator: `adjective-noun-verb` drawn uniformly at random.
#[derive(Debug, Default, Clone, Copy)]
pub struct HumanIdGenerator;

impl HumanIdGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for HumanIdGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let pick = |words: &[&'static str], rng: &mut rand::rngs::ThreadRng| {
            words.choose(rng).copied().unwrap_or("tunnel")
        };

        format!(
            "{}-{}-{}",
            pick(ADJECTIVES, &mut rng),
            pick(NOUNS, &mut rng),
            pick(VERBS, &mut rng)
        )
    }
}

/// Generator replaying a fixed sequence, then deferring to a fallback.
///
/// Useful wherever ids must be predictable, e.g. to force a collision.
#[derive(Debug)]
pub struct SequenceGenerator {
    queue: Mutex<VecDeque<String>>,
    fallback: HumanIdGenerator,
}

impl SequenceGenerator {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(ids.into_iter().map(Into::into).collect()),
            fallback: HumanIdGenerator,
        }
    }
}

impl IdGenerator for SequenceGenerator {
    fn generate(&self) -> String {
        let next = match self.queue.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| self.fallback.generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::is_valid_identity;
    use std::collections::HashSet;

    #[test]
    fn every_word_is_lowercase_ascii() {
        for word in ADJECTIVES.iter().chain(NOUNS).chain(VERBS) {
            assert!(
                word.bytes().all(|b| b.is_ascii_lowercase()),
                "bad word list entry {word}"
            );
        }
    }

    #[test]
    fn generated_ids_are_valid() {
        let generator = HumanIdGenerator::new();
        for _ in 0..500 {
            let id = generator.generate();
            assert!(is_valid_identity(&id), "{id} failed validation");
            assert_eq!(id.split('-').count(), 3);
        }
    }

    #[test]
    fn generated_ids_rarely_repeat() {
        let generator = HumanIdGenerator::new();
        let ids: HashSet<_> = (0..200).map(|_| generator.generate()).collect();
        assert!(ids.len() >= 195, "too many collisions: {}", ids.len());
    }

    #[test]
    fn sequence_generator_replays_then_falls_back() {
        let generator = SequenceGenerator::new(["first-id", "second-id"]);
        assert_eq!(generator.generate(), "first-id");
        assert_eq!(generator.generate(), "second-id");
        assert!(is_valid_identity(&generator.generate()));
    }
}
