use rand::Rng;
use rand::seq::IndexedRandom;

const COLORS: [&str; 20] = [
    "Red", "Blue", "Green", "Yellow", "Purple", "Orange", "Pink", "Brown", "Gray", "White",
    "Black", "Cyan", "Magenta", "Teal", "Indigo", "Violet", "Crimson", "Azure", "Coral", "Gold",
];

const ANIMALS: [&str; 20] = [
    "Lion", "Tiger", "Bear", "Wolf", "Fox", "Eagle", "Hawk", "Owl", "Deer", "Rabbit", "Dragon",
    "Phoenix", "Unicorn", "Griffin", "Panther", "Falcon", "Raven", "Snake", "Leopard", "Dolphin",
];

/// ARGB card colours handed out with catalog habits.
pub const HABIT_COLORS: [u32; 9] = [
    0xFFFFFFFF, 0xFFFCDCD3, 0xFFD7D9FF, 0xFFBBE5FA, 0xFFF7CECD, 0xFFFFE6B6, 0xFFC3EBC0,
    0xFFE8D3FF, 0xFFD5ECE0,
];

/// Placeholder display name such as "Teal Falcon".
pub fn random_display_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let color = COLORS.choose(rng).copied().unwrap_or("Gray");
    let animal = ANIMALS.choose(rng).copied().unwrap_or("Owl");
    format!("{} {}", color, animal)
}

pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    HABIT_COLORS.choose(rng).copied().unwrap_or(HABIT_COLORS[0])
}
