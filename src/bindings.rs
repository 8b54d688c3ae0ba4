//! Per-title bindings: everything the driver knows about a story that
//! the Z-machine Standard does not — where the score lives, what victory
//! text looks like, which diff entries are noise. Dispatch is by the
//! story filename's stem; unknown titles get the default row.

use lazy_static::lazy_static;
use log::debug;
use std::path::Path;

/// One supported title.
pub struct TitleBindings {
    pub name: &'static str,
    /// Commands issued once after setup, before the first observation
    pub intro_actions: &'static [&'static str],
    /// Strip prompts and echoes from a raw step observation
    pub clean_observation: fn(&str) -> String,
    pub victory: fn(&str) -> bool,
    pub game_over: fn(&str) -> bool,
    pub self_object: u16,
    pub max_score: i16,
    /// Highest object number the driver will inspect; 0 defers to the
    /// version maximum
    pub world_objects: u16,
    /// Read the score out of dynamic memory
    pub score: fn(&[u8]) -> i16,
    /// Read the move counter out of dynamic memory
    pub moves: fn(&[u8]) -> u16,
    pub ignore_moved_obj: fn(u16, u16) -> bool,
    pub ignore_attr_set: fn(u16, u16) -> bool,
    pub ignore_attr_clear: fn(u16, u16) -> bool,
    /// TextWorld-generated stories need setup-time probing
    pub is_textworld: bool,
}

fn clean_identity(obs: &str) -> String {
    obs.to_string()
}

/// Drop everything through the first newline (the echoed command).
fn clean_skip_first_line(obs: &str) -> String {
    match obs.find('\n') {
        Some(at) => obs[at + 1..].to_string(),
        None => obs.to_string(),
    }
}

/// Cut at the prompt: keep text before ">" less the preceding blank.
fn clean_to_prompt(obs: &str) -> String {
    let cut = match obs.find('>') {
        Some(at) => &obs[..at.saturating_sub(2)],
        None => obs,
    };
    cut.strip_prefix('\n').unwrap_or(cut).to_string()
}

/// Cut at a ">  " prompt, dropping the newline before it.
fn clean_to_spaced_prompt(obs: &str) -> String {
    match obs.find(">  ") {
        Some(at) => obs[..at.saturating_sub(1)].to_string(),
        None => obs.to_string(),
    }
}

fn no_victory(_world: &str) -> bool {
    false
}

fn standard_victory(world: &str) -> bool {
    world.contains("****  You have won  ****")
}

fn standard_game_over(world: &str) -> bool {
    world.contains("****  You have died  ****")
}

fn zero_score(_ram: &[u8]) -> i16 {
    0
}

fn zero_moves(_ram: &[u8]) -> u16 {
    0
}

fn byte_at(ram: &[u8], addr: usize) -> u8 {
    ram.get(addr).copied().unwrap_or(0)
}

fn signed_byte_score(ram: &[u8], addr: usize) -> i16 {
    byte_at(ram, addr) as i8 as i16
}

fn word_at(ram: &[u8], addr: usize) -> u16 {
    ((byte_at(ram, addr) as u16) << 8) | byte_at(ram, addr + 1) as u16
}

fn keep_all(_obj: u16, _n: u16) -> bool {
    false
}

// ---- zork1 ----

fn zork1_score(ram: &[u8]) -> i16 {
    signed_byte_score(ram, 8820)
}

fn zork1_moves(ram: &[u8]) -> u16 {
    word_at(ram, 8821)
}

fn zork1_victory(world: &str) -> bool {
    world.contains("Inside the Barrow")
}

/// The thief wanders by himself; his movements are not the player's
/// doing.
fn zork1_ignore_moved(obj: u16, _dest: u16) -> bool {
    obj == 114
}

fn zork1_ignore_attr_set(obj: u16, attr: u16) -> bool {
    obj == 114 || (obj == 4 && attr == 12)
}

fn zork1_ignore_attr_clear(obj: u16, attr: u16) -> bool {
    if (obj == 4 || obj == 114 || obj == 217) && (attr == 1 || attr == 2) {
        return true;
    }
    obj == 4 && attr == 12
}

// ---- zork2 / zork3 ----

fn zork2_score(ram: &[u8]) -> i16 {
    signed_byte_score(ram, 8936)
}

fn zork2_moves(ram: &[u8]) -> u16 {
    word_at(ram, 8937)
}

fn zork3_score(ram: &[u8]) -> i16 {
    byte_at(ram, 7955) as i16
}

fn zork3_moves(ram: &[u8]) -> u16 {
    word_at(ram, 7956)
}

// ---- ztuu ----

fn ztuu_score(ram: &[u8]) -> i16 {
    byte_at(ram, 8855) as i16
}

fn ztuu_moves(ram: &[u8]) -> u16 {
    byte_at(ram, 8857) as u16
}

fn ztuu_game_over(world: &str) -> bool {
    world.contains("Would you like to RESTART")
}

// ---- advent ----

fn advent_score(ram: &[u8]) -> i16 {
    byte_at(ram, 15372) as i16
}

fn advent_moves(ram: &[u8]) -> u16 {
    word_at(ram, 15361)
}

// ---- detective ----

fn detective_score(ram: &[u8]) -> i16 {
    byte_at(ram, 6802) as i16
}

fn detective_moves(ram: &[u8]) -> u16 {
    word_at(ram, 6777)
}

fn detective_game_over(world: &str) -> bool {
    world.contains("*** You have died ***")
}

// ---- textworld ----

fn textworld_victory(world: &str) -> bool {
    world.contains("*** The End ***")
}

fn textworld_game_over(world: &str) -> bool {
    world.contains("*** You lost! ***")
}

fn textworld_ignore_attr(_obj: u16, attr: u16) -> bool {
    attr == 35 || attr == 31
}

lazy_static! {
    pub static ref DEFAULT_BINDINGS: TitleBindings = TitleBindings {
        name: "default",
        intro_actions: &[],
        clean_observation: clean_identity,
        victory: standard_victory,
        game_over: standard_game_over,
        self_object: 20,
        max_score: 0,
        world_objects: 0,
        score: zero_score,
        moves: zero_moves,
        ignore_moved_obj: keep_all,
        ignore_attr_set: keep_all,
        ignore_attr_clear: keep_all,
        is_textworld: false,
    };
    static ref TITLES: Vec<TitleBindings> = vec![
        TitleBindings {
            name: "zork1",
            intro_actions: &[],
            clean_observation: clean_skip_first_line,
            victory: zork1_victory,
            game_over: standard_game_over,
            self_object: 4,
            max_score: 350,
            world_objects: 250,
            score: zork1_score,
            moves: zork1_moves,
            ignore_moved_obj: zork1_ignore_moved,
            ignore_attr_set: zork1_ignore_attr_set,
            ignore_attr_clear: zork1_ignore_attr_clear,
            is_textworld: false,
        },
        TitleBindings {
            name: "zork2",
            intro_actions: &[],
            clean_observation: clean_skip_first_line,
            victory: standard_victory,
            game_over: standard_game_over,
            self_object: 4,
            max_score: 400,
            world_objects: 250,
            score: zork2_score,
            moves: zork2_moves,
            ignore_moved_obj: keep_all,
            ignore_attr_set: keep_all,
            ignore_attr_clear: keep_all,
            is_textworld: false,
        },
        TitleBindings {
            name: "zork3",
            intro_actions: &[],
            clean_observation: clean_skip_first_line,
            victory: standard_victory,
            game_over: standard_game_over,
            self_object: 202,
            max_score: 7,
            world_objects: 219,
            score: zork3_score,
            moves: zork3_moves,
            ignore_moved_obj: keep_all,
            ignore_attr_set: keep_all,
            ignore_attr_clear: keep_all,
            is_textworld: false,
        },
        TitleBindings {
            name: "ztuu",
            intro_actions: &[],
            clean_observation: clean_to_prompt,
            victory: standard_victory,
            game_over: ztuu_game_over,
            self_object: 20,
            max_score: 100,
            world_objects: 180,
            score: ztuu_score,
            moves: ztuu_moves,
            ignore_moved_obj: keep_all,
            ignore_attr_set: keep_all,
            ignore_attr_clear: keep_all,
            is_textworld: false,
        },
        TitleBindings {
            name: "advent",
            intro_actions: &[],
            clean_observation: clean_to_prompt,
            victory: standard_victory,
            game_over: standard_game_over,
            self_object: 20,
            max_score: 350,
            world_objects: 255,
            score: advent_score,
            moves: advent_moves,
            ignore_moved_obj: keep_all,
            ignore_attr_set: keep_all,
            ignore_attr_clear: keep_all,
            is_textworld: false,
        },
        TitleBindings {
            name: "detective",
            intro_actions: &[],
            clean_observation: clean_to_spaced_prompt,
            victory: standard_victory,
            game_over: detective_game_over,
            self_object: 90,
            max_score: 360,
            world_objects: 101,
            score: detective_score,
            moves: detective_moves,
            ignore_moved_obj: keep_all,
            ignore_attr_set: keep_all,
            ignore_attr_clear: keep_all,
            is_textworld: false,
        },
        TitleBindings {
            name: "textworld",
            intro_actions: &[],
            clean_observation: clean_to_prompt,
            victory: textworld_victory,
            game_over: textworld_game_over,
            self_object: 0,
            max_score: 1,
            world_objects: 0,
            score: zero_score,
            moves: zero_moves,
            ignore_moved_obj: keep_all,
            ignore_attr_set: textworld_ignore_attr,
            ignore_attr_clear: textworld_ignore_attr,
            is_textworld: true,
        },
    ];
}

/// Pick the binding row for a story path. TextWorld-generated files all
/// start with "tw-"; everything else matches its stem exactly.
pub fn bindings_for(story_path: &str) -> &'static TitleBindings {
    let stem = Path::new(story_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    if stem.starts_with("tw-") {
        return TITLES.iter().find(|t| t.is_textworld).unwrap();
    }
    match TITLES.iter().find(|t| t.name == stem) {
        Some(title) => title,
        None => {
            debug!("no bindings for {:?}, using defaults", stem);
            &DEFAULT_BINDINGS
        }
    }
}
