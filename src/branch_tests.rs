//! Branch and jump behaviour: sense bits, short and long offsets, the
//! return-false/return-true encodings, and the compare family.

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

fn run_to_quit(interp: &mut Interpreter) -> String {
    loop {
        if let ExecutionResult::Quit = interp.step_instruction().unwrap() {
            break;
        }
    }
    interp.screen.drain_output()
}

#[test]
fn jz_taken_skips_ahead() {
    // jz 0 [+5] skips the first print_num
    let mut interp = interpreter_for(&[
        0x90, 0x00, 0xc5, // jz 0 -> +5
        0xe6, 0x7f, 99, // print_num 99 (skipped)
        0xe6, 0x7f, 42, // print_num 42
        0xba, // quit
    ]);
    assert_eq!(run_to_quit(&mut interp), "42");
}

#[test]
fn jz_not_taken_falls_through() {
    let mut interp = interpreter_for(&[
        0x90, 0x01, 0xc5, // jz 1: not taken
        0xe6, 0x7f, 99, // print_num 99
        0xba,
    ]);
    assert_eq!(run_to_quit(&mut interp), "99");
}

#[test]
fn inverted_sense_branches_on_false() {
    // jz 1 with the on-false sense (bit 7 clear) takes the branch
    let mut interp = interpreter_for(&[
        0x90, 0x01, 0x45, // jz 1 [~ +5]
        0xe6, 0x7f, 99, // skipped
        0xe6, 0x7f, 41, // printed
        0xba,
    ]);
    assert_eq!(run_to_quit(&mut interp), "41");
}

#[test]
fn je_matches_any_later_operand() {
    // je 5, 1, 2, 5 (VAR form, four operands) branches
    let mut interp = interpreter_for(&[
        0xc1, 0x55, 5, 1, 2, 5, 0xc5, // je ... -> +5
        0xe6, 0x7f, 99, // skipped
        0xe6, 0x7f, 77, 0xba,
    ]);
    assert_eq!(run_to_quit(&mut interp), "77");
}

#[test]
fn signed_comparisons() {
    // jl -1, 1: 0xffff < 1 when signed
    let mut interp = interpreter_for(&[
        0xc2, 0x1f, 0xff, 0xff, 0x01, 0xc5, // jl (VAR form) -> +5
        0xe6, 0x7f, 99, // skipped
        0xe6, 0x7f, 11, 0xba,
    ]);
    assert_eq!(run_to_quit(&mut interp), "11");

    // jg 2, -3 is true in signed arithmetic
    let mut interp = interpreter_for(&[
        0xc3, 0x0f, 0x00, 0x02, 0xff, 0xfd, 0xc5, // jg 2, 0xfffd -> +5
        0xe6, 0x7f, 99, 0xe6, 0x7f, 12, 0xba,
    ]);
    assert_eq!(run_to_quit(&mut interp), "12");
}

#[test]
fn test_bitmap_branch() {
    // test 0x0f, 0x05: all mask bits present
    let mut interp = interpreter_for(&[
        0x07, 0x0f, 0x05, 0xc5, // test -> +5
        0xe6, 0x7f, 99, 0xe6, 0x7f, 13, 0xba,
    ]);
    assert_eq!(run_to_quit(&mut interp), "13");
}

#[test]
fn jump_moves_relative() {
    // jump +5 skips a print_num (offset counts from after the operand)
    let mut interp = interpreter_for(&[
        0x8c, 0x00, 0x05, // jump +5
        0xe6, 0x7f, 99, // skipped
        0xe6, 0x7f, 14, 0xba,
    ]);
    assert_eq!(run_to_quit(&mut interp), "14");
}

#[test]
fn inc_chk_branches_after_increment() {
    // inc_chk G01, 0: G01 becomes 1 which is > 0
    let mut interp = interpreter_for(&[
        0x05, 0x11, 0x00, 0xc5, // inc_chk -> +5
        0xe6, 0x7f, 99, 0xe6, 0x7f, 15, 0xba,
    ]);
    assert_eq!(run_to_quit(&mut interp), "15");
    assert_eq!(interp.vm.read_variable(0x11).unwrap(), 1);
}

#[test]
fn dec_chk_branches_below_limit() {
    // dec_chk G01, 0: 0 - 1 = -1 < 0
    let mut interp = interpreter_for(&[
        0x04, 0x11, 0x00, 0xc5, // dec_chk -> +5
        0xe6, 0x7f, 99, 0xe6, 0x7f, 16, 0xba,
    ]);
    assert_eq!(run_to_quit(&mut interp), "16");
    assert_eq!(interp.vm.read_variable(0x11).unwrap(), 0xffff);
}

#[test]
fn long_branch_offset_reaches_far() {
    // jz 0 with a two-byte branch offset of +65 lands past the filler
    let mut code = vec![0x90, 0x00, 0x80, 65];
    // 63 bytes of print_num filler (21 instructions), all skipped
    for _ in 0..21 {
        code.extend([0xe6, 0x7f, 99]);
    }
    code.extend([0xe6, 0x7f, 17, 0xba]);
    let mut interp = interpreter_for(&code);
    assert_eq!(run_to_quit(&mut interp), "17");
}

#[test]
fn taken_branch_moves_pc_by_offset_minus_two() {
    // A taken 2-byte branch with encoded offset K lands at K - 2 past
    // the instruction end.
    let code = [0x90u8, 0x00, 0x80, 9, 0xba];
    let story = StoryBuilder::new(3).with_code(&code).build();
    let vm = VM::new(Game::from_bytes(story).unwrap());
    let mut interp = Interpreter::new(vm, Box::new(HeadlessScreen::new()));
    let start = interp.vm.pc;
    interp.step_instruction().unwrap();
    assert_eq!(interp.vm.pc, start + 4 + 9 - 2);
}
