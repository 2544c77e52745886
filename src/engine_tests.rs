//! End-to-end tests: sessions, both decode loops, chunking, combining and
//! memory accounting.

use std::mem;
use std::sync::Arc;
use std::thread;

use rstest::rstest;

use crate::disasm::{CHUNK_SIZE, RECORD_SIZE};
use crate::memory::{MemoryProvider, SystemMemory, TrackingMemory};
use crate::testing::{scripted_session, ID_BASE, INVALID, MOV, NOP, OVERRUN, PREFIX, STALL};
use crate::{close, errno, option, Arch, Error, Insn, Mode, Opt, Session};

fn x86_session(memory: Arc<dyn MemoryProvider>) -> Session {
    Session::open_with(Arch::X86, Mode::MODE_32, memory).unwrap()
}

fn slots(count: usize) -> Vec<Insn> {
    (0..count).map(|_| Insn::default()).collect()
}

#[rstest]
#[case(Arch::Arm, Mode::ARM)]
#[case(Arch::Arm, Mode::THUMB | Mode::BIG_ENDIAN)]
#[case(Arch::Arm64, Mode::LITTLE_ENDIAN)]
#[case(Arch::Mips, Mode::MODE_32)]
#[case(Arch::Mips, Mode::MODE_64 | Mode::BIG_ENDIAN)]
#[case(Arch::X86, Mode::MODE_16)]
#[case(Arch::X86, Mode::MODE_64)]
#[case(Arch::Ppc, Mode::MODE_32 | Mode::BIG_ENDIAN)]
fn test_open_close_balances(#[case] arch: Arch, #[case] mode: Mode) {
    let tracker = Arc::new(TrackingMemory::new());
    let mut handle = Some(Session::open_with(arch, mode, tracker.clone()).unwrap());
    assert!(tracker.live_bytes() > 0);

    close(&mut handle).unwrap();
    assert!(handle.is_none());
    assert!(tracker.is_balanced());
}

#[rstest]
#[case(Arch::Arm)]
#[case(Arch::Arm64)]
#[case(Arch::Mips)]
#[case(Arch::X86)]
#[case(Arch::Ppc)]
fn test_zero_buffer_same_count_in_both_variants(#[case] arch: Arch) {
    let session = Session::open_with(arch, arch.default_mode(), Arc::new(SystemMemory)).unwrap();
    let code = [0u8; 64];

    let mut out = slots(64);
    let fixed = session.disasm(&code, 0x1000, &mut out);
    let dynamic = session.disasm_all(&code, 0x1000, 0).unwrap();

    assert_eq!(fixed, dynamic.len());
    for (a, b) in out[..fixed].iter().zip(dynamic.iter()) {
        assert_eq!(a.address, b.address);
        assert_eq!(a.size, b.size);
        assert_eq!(a.mnemonic(), b.mnemonic());
    }
}

#[test]
fn test_good_then_garbage_stops_cleanly() {
    let session = x86_session(Arc::new(SystemMemory));
    let mut code = vec![0x90; 5];
    // mov eax, imm32 cut short
    code.extend_from_slice(&[0xb8, 0x01]);

    let mut out = slots(16);
    assert_eq!(session.disasm(&code, 0, &mut out), 5);
    assert_eq!(session.last_error(), None);

    let insns = session.disasm_all(&code, 0, 0).unwrap();
    assert_eq!(insns.len(), 5);
    assert!(insns.iter().all(|insn| insn.mnemonic() == "nop"));
    assert_eq!(session.last_error(), None);
}

#[test]
fn test_empty_input_and_output() {
    let session = x86_session(Arc::new(SystemMemory));
    let mut out = slots(4);
    assert_eq!(session.disasm(&[], 0, &mut out), 0);
    assert_eq!(session.disasm(&[0x90], 0, &mut []), 0);
    assert!(session.disasm_all(&[], 0, 0).unwrap().is_empty());
}

#[test]
fn test_fixed_capacity_never_overruns() {
    let session = x86_session(Arc::new(SystemMemory));
    let code = [0x90; 10];
    let mut out = slots(3);

    assert_eq!(session.disasm(&code, 0x400, &mut out), 3);
    assert_eq!(out[2].address, 0x402);
}

#[test]
fn test_multi_chunk_decode() {
    let tracker = Arc::new(TrackingMemory::new());
    let mut session = x86_session(tracker.clone());
    session.set_option(Opt::Detail(true)).unwrap();

    let total = CHUNK_SIZE * 3 + 5;
    let code = vec![0x90; total];
    let insns = session.disasm_all(&code, 0x1000, 0).unwrap();

    assert_eq!(insns.len(), total);
    assert_eq!(insns.allocated_bytes(), total * RECORD_SIZE);
    for (i, insn) in insns.iter().enumerate() {
        assert_eq!(insn.address, 0x1000 + i as u64);
        assert_eq!(insn.bytes(), &[0x90]);
        assert!(insn.detail().is_some());
    }

    crate::free(insns);
    session.close();
    assert!(tracker.is_balanced());
}

#[test]
fn test_count_caps_dynamic_decode() {
    let session = x86_session(Arc::new(SystemMemory));
    let code = vec![0x90; CHUNK_SIZE * 2];

    let insns = session.disasm_all(&code, 0, 70).unwrap();
    assert_eq!(insns.len(), 70);
    assert_eq!(insns.allocated_bytes(), 70 * RECORD_SIZE);
}

#[test]
fn test_prefix_fuses_across_chunk_boundary() {
    let session = scripted_session(Arc::new(SystemMemory));
    // 63 nops, then the prefix fills the last slot of the first chunk
    let mut code = vec![NOP; CHUNK_SIZE - 1];
    code.extend_from_slice(&PREFIX);
    code.extend_from_slice(&[MOV, 7, NOP]);

    let insns = session.disasm_all(&code, 0, 0).unwrap();
    assert_eq!(insns.len(), CHUNK_SIZE + 1);

    let fused = &insns[CHUNK_SIZE - 1];
    assert_eq!(fused.mnemonic(), "pfx.mov");
    assert_eq!(fused.op_str(), "r7");
    assert_eq!(fused.address, (CHUNK_SIZE - 1) as u64);
    assert_eq!(fused.size, 4);
    assert_eq!(fused.id, 3 + ID_BASE);

    // The cursor moved past the folded record
    let last = &insns[CHUNK_SIZE];
    assert_eq!(last.mnemonic(), "nop");
    assert_eq!(last.address, (CHUNK_SIZE + 3) as u64);
}

#[test]
fn test_first_record_is_never_combined() {
    let session = scripted_session(Arc::new(SystemMemory));
    let insns = session.disasm_all(&[MOV, 1, NOP], 0, 0).unwrap();
    assert_eq!(insns.len(), 2);
    assert_eq!(insns[0].mnemonic(), "mov");
}

#[test]
fn test_combining_only_in_dynamic_variant() {
    let session = scripted_session(Arc::new(SystemMemory));
    let code = [PREFIX[0], PREFIX[1], NOP];

    let mut out = slots(4);
    assert_eq!(session.disasm(&code, 0, &mut out), 2);
    assert_eq!(session.disasm_all(&code, 0, 0).unwrap().len(), 1);
}

#[test]
fn test_folded_records_do_not_count() {
    let session = scripted_session(Arc::new(SystemMemory));
    let code = [PREFIX[0], PREFIX[1], NOP, NOP, NOP];

    let insns = session.disasm_all(&code, 0, 2).unwrap();
    assert_eq!(insns.len(), 2);
    assert_eq!(insns[0].mnemonic(), "pfx.nop");
    assert_eq!(insns[1].address, 3);
}

#[test]
fn test_degenerate_decoder_results_end_the_loop() {
    let session = scripted_session(Arc::new(SystemMemory));
    let mut out = slots(8);

    assert_eq!(session.disasm(&[NOP, STALL, NOP], 0, &mut out), 1);
    assert_eq!(session.disasm(&[NOP, OVERRUN, NOP], 0, &mut out), 1);
    assert_eq!(session.disasm_all(&[NOP, NOP, INVALID, NOP], 0, 0).unwrap().len(), 2);
}

#[test]
fn test_public_ids_and_names() {
    let mut session = scripted_session(Arc::new(SystemMemory));
    session.set_option(Opt::Detail(true)).unwrap();
    let insns = session.disasm_all(&[NOP, MOV, 2], 0x10, 0).unwrap();

    assert_eq!(insns[0].id, 1 + ID_BASE);
    assert_eq!(session.insn_name(insns[1].id).as_deref(), Some("mov"));
    assert_eq!(session.reg_name(2).as_deref(), Some("r2"));
    assert_eq!(insns[1].bytes(), &[MOV, 2]);
    assert!(insns[1].reads_reg(2).unwrap());
}

#[test]
fn test_records_without_detail_keep_bytes_zeroed() {
    let session = x86_session(Arc::new(SystemMemory));
    let insns = session.disasm_all(&[0x89, 0xd8], 0, 0).unwrap();

    assert_eq!(insns[0].size, 2);
    assert_eq!(insns[0].bytes(), &[0, 0]);
    assert_eq!(insns[0].in_group(1), Err(Error::DetailUnavailable));
}

#[test]
fn test_x86_prefix_stays_in_mnemonic() {
    let session = x86_session(Arc::new(SystemMemory));
    // rep stosd
    let insns = session.disasm_all(&[0xf3, 0xab], 0, 0).unwrap();

    assert_eq!(insns.len(), 1);
    assert!(insns[0].mnemonic().starts_with("rep"));
    assert!(insns[0].mnemonic().contains("stos"));
}

#[test]
fn test_x86_wait_fuses_in_dynamic_decode() {
    let mut session = x86_session(Arc::new(SystemMemory));
    session.set_option(Opt::Detail(true)).unwrap();
    // wait; fnstsw ax; wait; fnstcw word ptr [ebp]
    let code = [0x9b, 0xdf, 0xe0, 0x9b, 0xd9, 0x7d, 0x00];

    let insns = session.disasm_all(&code, 0x400, 0).unwrap();
    assert_eq!(insns.len(), 2);
    assert_eq!((insns[0].address, insns[0].size), (0x400, 3));
    assert_eq!(insns[0].mnemonic(), "fstsw");
    assert_eq!(insns[0].op_str(), "ax");
    assert_eq!(insns[0].bytes(), &code[..3]);
    assert_eq!((insns[1].address, insns[1].size), (0x403, 4));
    assert_eq!(insns[1].mnemonic(), "fstcw");
    assert_eq!(insns[1].op_str(), "word ptr [ebp]");
    assert_eq!(insns[1].bytes(), &code[3..]);

    let mut out = slots(8);
    assert_eq!(session.disasm(&code, 0x400, &mut out), 4);
    assert_eq!(out[0].mnemonic(), "wait");
    assert_eq!(out[1].mnemonic(), "fnstsw");
}

#[test]
fn test_side_table_is_accounted() {
    let tracker = Arc::new(TrackingMemory::new());
    let session = Session::open_with(Arch::Arm, Mode::ARM, tracker.clone()).unwrap();
    let slots = session.register_table().map_or(0, |table| table.len());
    assert!(slots > 0);
    assert!(tracker.live_bytes() >= mem::size_of::<Session>() + slots * mem::size_of::<Option<String>>());

    session.close();
    assert!(tracker.is_balanced());
}

#[test]
fn test_side_table_refused_under_small_limit() {
    let tracker = Arc::new(TrackingMemory::with_limit(mem::size_of::<Session>() + 1024));
    let result = Session::open_with(Arch::Arm, Mode::ARM, tracker.clone());

    assert_eq!(result.err(), Some(Error::OutOfMemory));
    assert!(tracker.is_balanced());

    // x86 keeps no side table and fits
    x86_session(tracker.clone()).close();
    assert!(tracker.is_balanced());
}

#[test]
fn test_memory_option_without_session() {
    assert_eq!(option(None, Opt::Memory(Arc::new(SystemMemory))), Ok(()));
    assert!(crate::registry().is_configured());

    assert_eq!(option(None, Opt::Detail(true)), Err(Error::InvalidHandle));
    assert_eq!(option(None, Opt::Syntax(crate::Syntax::Att)), Err(Error::InvalidHandle));
}

#[test]
fn test_option_through_handle() {
    let mut session = x86_session(Arc::new(SystemMemory));
    assert_eq!(option(Some(&mut session), Opt::Detail(true)), Ok(()));
    assert!(session.detail());

    assert_eq!(
        option(Some(&mut session), Opt::Syntax(crate::Syntax::NoRegName)),
        Err(Error::InvalidOption)
    );
    assert_eq!(errno(Some(&session)), Some(Error::InvalidOption));

    // Any decode call clears the sticky error
    session.disasm_all(&[0x90], 0, 0).unwrap();
    assert_eq!(errno(Some(&session)), None);
}

#[test]
fn test_close_twice() {
    let mut handle = Some(x86_session(Arc::new(SystemMemory)));
    assert_eq!(close(&mut handle), Ok(()));
    assert_eq!(close(&mut handle), Err(Error::InvalidHandle));
}

#[test]
fn test_growth_refusal_aborts_dynamic_decode() {
    let limit = mem::size_of::<Session>() + CHUNK_SIZE * RECORD_SIZE;
    let tracker = Arc::new(TrackingMemory::with_limit(limit));
    let session = x86_session(tracker.clone());
    let baseline = tracker.live_bytes();

    let code = vec![0x90; CHUNK_SIZE * 3];
    let result = session.disasm_all(&code, 0, 0);

    assert_eq!(result.err(), Some(Error::OutOfMemory));
    assert_eq!(session.last_error(), Some(Error::OutOfMemory));
    assert_eq!(tracker.live_bytes(), baseline);

    // Within the limit the same session still works
    let insns = session.disasm_all(&code[..CHUNK_SIZE], 0, 0).unwrap();
    assert_eq!(insns.len(), CHUNK_SIZE);
    drop(insns);

    session.close();
    assert!(tracker.is_balanced());
}

#[test]
fn test_detail_refusal_stops_fixed_decode() {
    let tracker = Arc::new(TrackingMemory::with_limit(mem::size_of::<Session>()));
    let mut session = x86_session(tracker.clone());
    session.set_option(Opt::Detail(true)).unwrap();

    let mut out = slots(4);
    assert_eq!(session.disasm(&[0x90, 0x90], 0, &mut out), 0);
    assert_eq!(session.last_error(), Some(Error::OutOfMemory));

    drop(out);
    session.close();
    assert!(tracker.is_balanced());
}

#[test]
fn test_sessions_on_separate_threads() {
    let tracker = Arc::new(TrackingMemory::new());
    let x86 = x86_session(tracker.clone());
    let arm = Session::open_with(Arch::Arm, Mode::ARM, tracker.clone()).unwrap();

    let a = thread::spawn(move || {
        let count = x86.disasm_all(&[0x90; 100], 0, 0).map(|insns| insns.len());
        x86.close();
        count
    });
    let b = thread::spawn(move || {
        // mov r0, r1 repeated
        let code: Vec<u8> = [0x01, 0x00, 0xa0, 0xe1].repeat(25);
        let count = arm.disasm_all(&code, 0, 0).map(|insns| insns.len());
        arm.close();
        count
    });

    assert_eq!(a.join().unwrap(), Ok(100));
    assert_eq!(b.join().unwrap(), Ok(25));
    assert!(tracker.is_balanced());
}
