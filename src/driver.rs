//! Host interface: load a story once per process, feed it one command
//! per step, observe text and world-state diffs, snapshot and restore.
//!
//! The interpreter internals all take the machine as an explicit
//! context; this layer is what enforces the one-active-instance contract
//! and applies the per-title bindings.

use crate::bindings::{bindings_for, TitleBindings};
use crate::interpreter::{Interpreter, StopReason};
use crate::quetzal;
use crate::screen_headless::HeadlessScreen;
use crate::vm::{Game, VM, STACK_SIZE};
use lazy_static::lazy_static;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

lazy_static! {
    static ref DRIVER_ACTIVE: AtomicBool = AtomicBool::new(false);
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("cannot open story: {0}")]
    StoryOpen(String),
    #[error("another driver is already active in this process")]
    AlreadyActive,
    #[error("the story has finished")]
    Finished,
    #[error("snapshot error: {0}")]
    Snapshot(String),
    #[error("machine fault: {0}")]
    Machine(String),
}

/// Object-tree snapshot of a single object, as the host sees it.
#[derive(Debug, Clone, Default)]
pub struct WorldObject {
    pub num: u16,
    pub name: String,
    pub parent: u16,
    pub sibling: u16,
    pub child: u16,
    pub attr: [u8; 4],
    pub properties: [u8; 16],
}

/// Filtered world-state changes from the latest step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldDiff {
    pub moves: Vec<(u16, u16)>,
    pub attr_sets: Vec<(u16, u16)>,
    pub attr_clears: Vec<(u16, u16)>,
}

/// The programmatic player. One per process.
pub struct Driver {
    interp: Interpreter,
    bindings: &'static TitleBindings,
    seed: u32,
    /// Cleaned text of the latest observation
    world: String,
    // TextWorld-generated stories are probed at setup time
    tw_moves: u16,
    tw_player: u16,
    tw_objects: u16,
}

impl Driver {
    /// Load a story file and run to the first prompt. Must be called
    /// exactly once per process before any step.
    pub fn setup(story_path: &str, seed: u32) -> Result<(Driver, String), DriverError> {
        let bytes = std::fs::read(story_path)
            .map_err(|e| DriverError::StoryOpen(format!("{story_path}: {e}")))?;
        Self::setup_from_bytes(story_path, bytes, seed)
    }

    /// As `setup`, from an in-memory story image. The path is still used
    /// for binding dispatch.
    pub fn setup_from_bytes(
        story_path: &str,
        bytes: Vec<u8>,
        seed: u32,
    ) -> Result<(Driver, String), DriverError> {
        if DRIVER_ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(DriverError::AlreadyActive);
        }

        let result = Self::build(story_path, bytes, seed);
        if result.is_err() {
            DRIVER_ACTIVE.store(false, Ordering::SeqCst);
        }
        result
    }

    fn build(
        story_path: &str,
        bytes: Vec<u8>,
        seed: u32,
    ) -> Result<(Driver, String), DriverError> {
        let game = Game::from_bytes(bytes).map_err(DriverError::StoryOpen)?;
        info!(
            "loaded {:?}: version {}, release {}",
            story_path, game.header.version, game.header.release
        );
        let vm = VM::new(game);
        let mut interp = Interpreter::new(vm, Box::new(HeadlessScreen::new()));
        interp.rng.seed_deterministic(seed);

        let mut driver = Driver {
            interp,
            bindings: bindings_for(story_path),
            seed,
            world: String::new(),
            tw_moves: 0,
            tw_player: 0,
            tw_objects: 0,
        };

        driver.run_to_prompt()?;
        for action in driver.bindings.intro_actions {
            driver.raw_step(action)?;
        }
        if driver.bindings.is_textworld {
            driver.probe_textworld()?;
        }

        let raw = driver.interp.screen.drain_output();
        driver.world = (driver.bindings.clean_observation)(&raw);
        let observation = driver.world.clone();
        Ok((driver, observation))
    }

    /// Feed one player command and run to the next prompt. Returns the
    /// cleaned observation.
    pub fn step(&mut self, action: &str) -> Result<String, DriverError> {
        if self.interp.is_finished() {
            return Err(DriverError::Finished);
        }
        self.interp.vm.diffs.clear();
        self.raw_step(action)?;

        let raw = self.interp.screen.drain_output();
        if self.bindings.is_textworld {
            if let Some(count) = parse_move_count(&raw) {
                self.tw_moves = count;
            }
        }
        self.world = (self.bindings.clean_observation)(&raw);
        Ok(self.world.clone())
    }

    fn raw_step(&mut self, action: &str) -> Result<(), DriverError> {
        let line = action.trim_end_matches('\n');
        self.interp.screen.queue_input(line);
        self.run_to_prompt()
    }

    fn run_to_prompt(&mut self) -> Result<(), DriverError> {
        match self.interp.run_until_input() {
            Ok(StopReason::AwaitInput) | Ok(StopReason::Finished) => Ok(()),
            Err(e) => Err(DriverError::Machine(e)),
        }
    }

    /// TextWorld stories carry debug commands that reveal the object
    /// count and the player object; learn both, then start over.
    fn probe_textworld(&mut self) -> Result<(), DriverError> {
        self.interp.screen.drain_output();
        self.raw_step("tree")?;
        let tree = self.interp.screen.drain_output();
        if let Some(count) = parse_object_count(&tree) {
            self.tw_objects = count;
        }
        self.raw_step("scope")?;
        let scope = self.interp.screen.drain_output();
        if let Some(player) = parse_player_object(&scope) {
            self.tw_player = player;
        }
        debug!(
            "textworld probe: {} objects, player {}",
            self.tw_objects, self.tw_player
        );
        self.interp
            .restart()
            .map_err(DriverError::Machine)?;
        self.run_to_prompt()
    }

    // ---- snapshots ----

    /// Serialise the machine into a snapshot buffer.
    pub fn save_data(&mut self) -> Result<Vec<u8>, DriverError> {
        if self.interp.in_interrupt() {
            return Err(DriverError::Snapshot(
                "cannot save during an interrupt routine".to_string(),
            ));
        }
        Ok(quetzal::save_to_bytes(&self.interp.vm))
    }

    /// Restore a snapshot produced by `save_data`. The PRNG is re-seeded
    /// so a restored run replays deterministically.
    pub fn restore_data(&mut self, data: &[u8]) -> Result<(), DriverError> {
        quetzal::restore_from_bytes(&mut self.interp.vm, data)
            .map_err(DriverError::Snapshot)?;
        self.interp.restore_header();
        self.interp.rng.seed_deterministic(self.seed);
        self.interp.vm.diffs.clear();
        self.interp.screen.drain_output();
        Ok(())
    }

    // ---- introspection ----

    pub fn get_ram_size(&self) -> usize {
        self.interp.vm.game.header.dynamic_size as usize
    }

    pub fn get_ram(&self) -> &[u8] {
        &self.interp.vm.game.memory[..self.get_ram_size()]
    }

    pub fn get_stack_size(&self) -> usize {
        STACK_SIZE
    }

    /// The evaluation stack as a fixed-size window, unused slots zero.
    pub fn get_stack(&self) -> Vec<u16> {
        let mut words = self.interp.vm.stack.clone();
        words.resize(STACK_SIZE, 0);
        words
    }

    pub fn get_pc(&self) -> u32 {
        self.interp.vm.pc
    }

    /// Operands of the most recently executed instruction.
    pub fn get_zargs(&self) -> [u16; 8] {
        self.interp.vm.last_operands
    }

    pub fn get_num_world_objs(&self) -> u16 {
        if self.bindings.is_textworld && self.tw_objects != 0 {
            return self.tw_objects;
        }
        if self.bindings.world_objects != 0 {
            return self.bindings.world_objects;
        }
        self.interp.vm.max_objects()
    }

    pub fn get_self_object(&self) -> u16 {
        if self.bindings.is_textworld && self.tw_player != 0 {
            return self.tw_player;
        }
        self.bindings.self_object
    }

    /// Inspect one object: links, attribute bytes, property ids.
    pub fn get_object(&self, num: u16) -> Option<WorldObject> {
        if num == 0 || num > self.get_num_world_objs() {
            return None;
        }
        let vm = &self.interp.vm;
        let name = vm.object_name(num).ok()?;
        if name.is_empty() || name.len() > 64 {
            return None;
        }
        let addr = vm.object_address(num).ok()?;
        let mut attr = [0u8; 4];
        for (i, slot) in attr.iter_mut().enumerate() {
            *slot = vm.read_byte(addr + i as u32);
        }

        let mut properties = [0u8; 16];
        let mask = if vm.game.header.version <= 3 { 0x1f } else { 0x3f };
        let mut prop_addr = vm.first_property(num).ok()?;
        for slot in properties.iter_mut() {
            let value = vm.read_byte(prop_addr);
            if value == 0 {
                break;
            }
            *slot = value & mask;
            prop_addr = vm.next_property_addr(prop_addr);
        }

        Some(WorldObject {
            num,
            name,
            parent: vm.obj_parent(num).ok()?,
            sibling: vm.obj_sibling(num).ok()?,
            child: vm.obj_child(num).ok()?,
            attr,
            properties,
        })
    }

    /// The diff rings from the latest step, with per-title noise removed.
    pub fn get_world_diff(&self) -> WorldDiff {
        let diffs = &self.interp.vm.diffs;
        WorldDiff {
            moves: diffs
                .moves
                .iter()
                .filter(|(o, d)| !(self.bindings.ignore_moved_obj)(*o, *d))
                .copied()
                .collect(),
            attr_sets: diffs
                .attr_sets
                .iter()
                .filter(|(o, a)| !(self.bindings.ignore_attr_set)(*o, *a))
                .copied()
                .collect(),
            attr_clears: diffs
                .attr_clears
                .iter()
                .filter(|(o, a)| !(self.bindings.ignore_attr_clear)(*o, *a))
                .copied()
                .collect(),
        }
    }

    /// Did the latest step change the world (beyond filtered noise)?
    pub fn world_changed(&self) -> bool {
        let diff = self.get_world_diff();
        !(diff.moves.is_empty() && diff.attr_sets.is_empty() && diff.attr_clears.is_empty())
    }

    // ---- world manipulation ----

    /// Relocate one object, exactly as the insert_obj opcode would.
    pub fn teleport_obj(&mut self, obj: u16, dest: u16) -> Result<(), DriverError> {
        self.interp
            .vm
            .insert_object(obj, dest)
            .map_err(|e| DriverError::Machine(e.message().to_string()))
    }

    /// Relocate an object together with its whole sibling chain; their
    /// descendants follow their parents.
    pub fn teleport_tree(&mut self, obj: u16, dest: u16) -> Result<(), DriverError> {
        let mut chain = Vec::new();
        let mut current = obj;
        while current != 0 {
            chain.push(current);
            current = self
                .interp
                .vm
                .obj_sibling(current)
                .map_err(|e| DriverError::Machine(e.message().to_string()))?;
        }
        for o in chain {
            self.teleport_obj(o, dest)?;
        }
        Ok(())
    }

    // ---- per-title state ----

    pub fn get_score(&self) -> i16 {
        (self.bindings.score)(self.get_ram())
    }

    pub fn get_moves(&self) -> u16 {
        if self.bindings.is_textworld {
            return self.tw_moves;
        }
        (self.bindings.moves)(self.get_ram())
    }

    pub fn get_max_score(&self) -> i16 {
        self.bindings.max_score
    }

    pub fn victory(&self) -> bool {
        (self.bindings.victory)(&self.world)
    }

    pub fn game_over(&self) -> bool {
        (self.bindings.game_over)(&self.world)
    }

    pub fn is_finished(&self) -> bool {
        self.interp.is_finished()
    }

    /// The latest cleaned observation.
    pub fn world(&self) -> &str {
        &self.world
    }

    /// The interpreter, for embedders that need lower-level access.
    pub fn interpreter(&mut self) -> &mut Interpreter {
        &mut self.interp
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        DRIVER_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// "-= Kitchen =- 3/12" -> 12: the count after the last slash.
fn parse_move_count(obs: &str) -> Option<u16> {
    let at = obs.rfind('/')?;
    let digits: String = obs[at + 1..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// "... EndOfObject (412)" -> 412.
fn parse_object_count(text: &str) -> Option<u16> {
    let end = text.find("EndOfObject")?;
    let open = text[end..].find('(')? + end;
    let digits: String = text[open + 1..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// "... yourself (209) ..." -> 209.
fn parse_player_object(text: &str) -> Option<u16> {
    let at = text.find("yourself (")?;
    let digits: String = text[at + 10..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textworld_parsers() {
        assert_eq!(parse_move_count("-= Studio =- 0/4"), Some(4));
        assert_eq!(parse_move_count("no slash here"), None);
        assert_eq!(
            parse_object_count("tree dump EndOfObject (412) trailing"),
            Some(412)
        );
        assert_eq!(parse_player_object("in scope: yourself (209), a table"), Some(209));
        assert_eq!(parse_player_object("nothing"), None);
    }
}
