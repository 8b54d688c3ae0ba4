//! Call and return discipline: argument passing, local initialisation,
//! store/discard variants, return-through-branch encodings, and
//! catch/throw unwinding.

use crate::interpreter::{ExecutionResult, Interpreter};
use crate::screen_headless::HeadlessScreen;
use crate::test_utils::{StoryBuilder, START_PC};
use crate::vm::{Game, VM};
use test_log::test;

/// Routine area: byte address 0x0800 packs to 0x0400 in V3.
const ROUTINE_ADDR: usize = 0x0800;
const ROUTINE_PACKED_HI: u8 = 0x04;
const ROUTINE_PACKED_LO: u8 = 0x00;

fn interpreter_with_routine(main: &[u8], routine: &[u8]) -> Interpreter {
    let mut code = vec![0u8; ROUTINE_ADDR + routine.len() - START_PC];
    code[..main.len()].copy_from_slice(main);
    code[ROUTINE_ADDR - START_PC..].copy_from_slice(routine);
    let story = StoryBuilder::new(3).with_code(&code).build();
    let vm = VM::new(Game::from_bytes(story).unwrap());
    Interpreter::new(vm, Box::new(HeadlessScreen::new()))
}

fn run_to_quit(interp: &mut Interpreter) {
    loop {
        if let ExecutionResult::Quit = interp.step_instruction().unwrap() {
            break;
        }
    }
}

#[test]
fn call_passes_arguments_into_locals() {
    // main: call routine(0x0abc) -> stack ; quit
    let main = [
        0xe0, 0x0f, ROUTINE_PACKED_HI, ROUTINE_PACKED_LO, 0x0a, 0xbc, 0x00, 0xba,
    ];
    // routine: 2 locals (defaults 0x1111, 0x2222); ret L01
    let routine = [2, 0x11, 0x11, 0x22, 0x22, 0xab, 0x01];
    let mut interp = interpreter_with_routine(&main, &routine);
    run_to_quit(&mut interp);
    assert_eq!(interp.vm.stack, vec![0x0abc]);
}

#[test]
fn unsupplied_locals_take_code_defaults() {
    // Called with one arg, the second local keeps its inline default
    let main = [
        0xe0, 0x0f, ROUTINE_PACKED_HI, ROUTINE_PACKED_LO, 0x0a, 0xbc, 0x00, 0xba,
    ];
    // routine: ret L02
    let routine = [2, 0x11, 0x11, 0x22, 0x22, 0xab, 0x02];
    let mut interp = interpreter_with_routine(&main, &routine);
    run_to_quit(&mut interp);
    assert_eq!(interp.vm.stack, vec![0x2222]);
}

#[test]
fn call_to_address_zero_yields_false() {
    let main = [0xe0, 0x3f, 0x00, 0x00, 0x00, 0xba];
    let routine = [0u8];
    let mut interp = interpreter_with_routine(&main, &routine);
    run_to_quit(&mut interp);
    assert_eq!(interp.vm.stack, vec![0]);
}

#[test]
fn rtrue_rfalse_and_ret_popped() {
    // call with no arguments -> stack ; quit
    let main = [
        0xe0, 0x3f, ROUTINE_PACKED_HI, ROUTINE_PACKED_LO, 0x00, 0xba,
    ];

    // routine: push 7 ; ret_popped
    let routine = [0, 0xe8, 0x7f, 0x07, 0xb8];
    let mut interp = interpreter_with_routine(&main, &routine);
    run_to_quit(&mut interp);
    assert_eq!(interp.vm.stack, vec![7]);

    // routine: rtrue
    let routine_true = [0u8, 0xb0];
    let mut interp = interpreter_with_routine(&main, &routine_true);
    run_to_quit(&mut interp);
    assert_eq!(interp.vm.stack, vec![1]);

    // routine: rfalse
    let routine_false = [0u8, 0xb1];
    let mut interp = interpreter_with_routine(&main, &routine_false);
    run_to_quit(&mut interp);
    assert_eq!(interp.vm.stack, vec![0]);
}

#[test]
fn branch_offset_one_returns_true() {
    // routine: jz 0 [offset 1] => return true from the routine
    let main = [
        0xe0, 0x3f, ROUTINE_PACKED_HI, ROUTINE_PACKED_LO, 0x00, 0xba,
    ];
    let routine = [0, 0x90, 0x00, 0xc1];
    let mut interp = interpreter_with_routine(&main, &routine);
    run_to_quit(&mut interp);
    assert_eq!(interp.vm.stack, vec![1]);

    // offset 0 => return false
    let routine0 = [0, 0x90, 0x00, 0xc0];
    let mut interp = interpreter_with_routine(&main, &routine0);
    run_to_quit(&mut interp);
    assert_eq!(interp.vm.stack, vec![0]);
}

#[test]
fn check_arg_count_sees_supplied_arguments() {
    // routine of 2 locals called with 1 arg:
    //   check_arg_count 1 [taken -> rtrue] ; rfalse
    let main = [
        0xe0, 0x0f, ROUTINE_PACKED_HI, ROUTINE_PACKED_LO, 0x00, 0x05, 0x00, 0xba,
    ];
    let routine = [
        2, 0, 0, 0, 0, // locals
        0xff, 0x7f, 0x01, 0xc3, // check_arg_count 1 -> +3
        0xb1, // rfalse (fallthrough)
        0xb0, // rtrue (branch target)
    ];
    let mut interp = interpreter_with_routine(&main, &routine);
    run_to_quit(&mut interp);
    assert_eq!(interp.vm.stack, vec![1]);

    // check_arg_count 2 with one supplied arg falls through to rfalse
    let routine2 = [2, 0, 0, 0, 0, 0xff, 0x7f, 0x02, 0xc3, 0xb1, 0xb0];
    let mut interp = interpreter_with_routine(&main, &routine2);
    run_to_quit(&mut interp);
    assert_eq!(interp.vm.stack, vec![0]);
}

#[test]
fn frames_isolate_evaluation_stack() {
    // main pushes a word, then calls a routine that pops greedily; the
    // pop underflows because a routine cannot pop past its frame base.
    let main = [
        0xe8, 0x7f, 0x34, // push 0x34
        0xe0, 0x3f, ROUTINE_PACKED_HI, ROUTINE_PACKED_LO, 0x00, 0xba,
    ];
    // routine: ret_popped with nothing pushed in this frame
    let routine = [0, 0xb8];
    let mut interp = interpreter_with_routine(&main, &routine);
    interp.step_instruction().unwrap(); // push
    interp.step_instruction().unwrap(); // call
    let err = interp.step_instruction().unwrap_err();
    assert!(err.contains("underflow"), "{err}");
}

#[test]
fn catch_and_throw_unwind_frames() {
    // V5: routine A catches, passes the frame id to B; B throws 99 back
    // through A, which returns it to main's store.
    let mut code = vec![0u8; 0x0a00 - START_PC];
    // main: call_vs A -> stack ; quit     (0x0800 packs to 0x0200)
    code[..6].copy_from_slice(&[0xe0, 0x3f, 0x02, 0x00, 0x00, 0xba]);
    // A at 0x0800: 1 local; catch -> L01 ; call_vs B(L01) -> stack ; rfalse
    let a = [1u8, 0xb9, 0x01, 0xe0, 0x2f, 0x02, 0x40, 0x01, 0x00, 0xb1];
    code[0x0800 - START_PC..0x0800 - START_PC + a.len()].copy_from_slice(&a);
    // B at 0x0900: 1 local; throw 99, L01
    let b = [1u8, 0x3c, 99, 0x01];
    code[0x0900 - START_PC..0x0900 - START_PC + b.len()].copy_from_slice(&b);

    let story = StoryBuilder::new(5).with_code(&code).build();
    let vm = VM::new(Game::from_bytes(story).unwrap());
    let mut interp = Interpreter::new(vm, Box::new(HeadlessScreen::new()));
    run_to_quit(&mut interp);
    assert_eq!(interp.vm.stack, vec![99]);
    assert_eq!(interp.vm.call_stack.len(), 1);
}

#[test]
fn deep_recursion_overflows() {
    // main calls the routine; the routine calls itself forever
    let main = [
        0xe0, 0x3f, ROUTINE_PACKED_HI, ROUTINE_PACKED_LO, 0x00, 0xba,
    ];
    let routine = [
        0, 0xe0, 0x3f, ROUTINE_PACKED_HI, ROUTINE_PACKED_LO, 0x00, 0xb0,
    ];
    let mut interp = interpreter_with_routine(&main, &routine);
    let mut result = Ok(ExecutionResult::Continue);
    for _ in 0..200_000 {
        result = interp.step_instruction();
        if result.is_err() {
            break;
        }
    }
    assert!(result.unwrap_err().contains("Stack overflow"));
}
