//! Transient-execution attack scenarios.
//!
//! These are the point of the whole machine: architecturally invisible
//! execution leaving microarchitecturally visible traces.

mod common;

use teem_core::{Config, Status};

/// The secret byte planted at the inaccessible target address.
const SECRET: u8 = 0xa5;

/// Address the spectre demo leaks from (inaccessible half).
const TARGET: u32 = 0xdead_beef;

#[test]
fn test_spectre_btb_recovers_the_secret_byte() {
    let mut cpu = common::cpu_with(
        &Config::default(),
        include_str!("../../../demos/spectre-btb.asm"),
    );
    cpu.memory_mut().poke(TARGET, SECRET);

    let status = common::run(&mut cpu);
    assert_eq!(status, Status::Halted { exit_code: SECRET as i32 });
}

#[test]
fn test_spectre_btb_with_a_different_secret() {
    let mut cpu = common::cpu_with(
        &Config::default(),
        include_str!("../../../demos/spectre-btb.asm"),
    );
    cpu.memory_mut().poke(TARGET, 0x3c);

    let status = common::run(&mut cpu);
    assert_eq!(status, Status::Halted { exit_code: 0x3c });
}

#[test]
fn test_suppression_mitigation_defeats_the_leak() {
    // With the mitigation on, faulting loads return zero into the transient
    // window: every probed bit reads as "uncached".
    let mut config = Config::default();
    config.mitigations.suppress_faulting_loads = true;

    let mut cpu = common::cpu_with(&config, include_str!("../../../demos/spectre-btb.asm"));
    cpu.memory_mut().poke(TARGET, SECRET);

    let status = common::run(&mut cpu);
    assert_eq!(status, Status::Halted { exit_code: 0 });
}

#[test]
fn test_transient_window_observably_differs_from_in_order() {
    // An in-order machine would never touch 0x5000: the branch is not
    // taken. This machine predicts it taken and leaves the trace behind.
    let mut cpu = common::cpu_with(
        &Config::default(),
        "\
_start:
    li   s2, 0x5000
    li   t0, 3
    li   t1, 4
    beq  t0, t1, wrong_path
    j    out
wrong_path:
    lbu  t2, 0(s2)
out:
    li   a0, 0
    li   a7, -1
    ecall
",
    );
    let status = common::run(&mut cpu);
    assert_eq!(status, Status::Halted { exit_code: 0 });
    assert!(cpu.memory().is_cached(0x5000));
}
