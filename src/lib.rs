#![crate_name = "zealot"]
#![allow(dead_code)]

pub mod bindings;
pub mod buffer;
pub mod dictionary;
pub mod driver;
pub mod err;
pub mod header;
pub mod instruction;
pub mod interpreter;
pub mod opcodes_io;
pub mod opcodes_math;
pub mod opcodes_memory;
pub mod opcodes_object;
pub mod opcodes_text;
pub mod quetzal;
pub mod screen_headless;
pub mod screen_trait;
pub mod story_id;
pub mod streams;
pub mod test_utils;
pub mod text;
pub mod undo;
pub mod vm;
pub mod zobject;
pub mod zrand;

#[cfg(test)]
mod branch_tests;
#[cfg(test)]
mod call_tests;

#[cfg(test)]
mod tests {
    use crate::interpreter::{ExecutionResult, Interpreter};
    use crate::screen_headless::HeadlessScreen;
    use crate::test_utils::StoryBuilder;
    use crate::vm::{Game, VM};
    use test_log::test;

    fn interpreter_for(code: &[u8]) -> Interpreter {
        let story = StoryBuilder::new(3).with_code(code).build();
        let vm = VM::new(Game::from_bytes(story).unwrap());
        Interpreter::new(vm, Box::new(HeadlessScreen::new()))
    }

    #[test]
    fn print_num_and_quit() {
        // print_num 42 ; new_line ; quit
        let mut interp = interpreter_for(&[0xe6, 0x7f, 42, 0xbb, 0xba]);
        loop {
            match interp.step_instruction().unwrap() {
                ExecutionResult::Quit => break,
                _ => {}
            }
        }
        assert_eq!(interp.screen.drain_output(), "42\n");
    }

    #[test]
    fn signed_print_num() {
        // print_num -1 (large constant 0xffff) ; quit flushes the wrap buffer
        let mut interp = interpreter_for(&[0xe6, 0x3f, 0xff, 0xff, 0xba]);
        interp.step_instruction().unwrap();
        interp.step_instruction().unwrap();
        assert_eq!(interp.screen.drain_output(), "-1");
    }

    #[test]
    fn arithmetic_stores_to_stack() {
        // add 5, 7 -> stack ; quit
        let mut interp = interpreter_for(&[0x14, 5, 7, 0x00, 0xba]);
        interp.step_instruction().unwrap();
        assert_eq!(interp.vm.stack, vec![12]);
    }

    #[test]
    fn division_by_zero_is_fatal() {
        // div 5, 0 -> stack
        let mut interp = interpreter_for(&[0x17, 5, 0, 0x00, 0xba]);
        let err = interp.step_instruction().unwrap_err();
        assert!(err.contains("Division by zero"));
    }
}
