//! Plain-text renderers for the engine snapshots.

use teem_core::asm::parser::ABI_NAMES;
use teem_core::Cpu;

/// Prints the architectural register file, four per row.
pub fn print_regs(cpu: &Cpu) {
    let regs = cpu.regs();
    for row in 0..8 {
        let mut line = String::new();
        for col in 0..4 {
            let i = row * 4 + col;
            line.push_str(&format!("{:>4}={:#010x}  ", ABI_NAMES[i], regs[i].value()));
        }
        println!("{}", line.trim_end());
    }
    println!("cycle {}", cpu.cycles());
}

/// Prints the reorder buffer, oldest first.
pub fn print_rob(cpu: &Cpu) {
    let view = cpu.rob_view();
    if view.entries.is_empty() {
        println!("rob: empty");
        return;
    }
    println!("tag   | pc       | state | instruction");
    println!("------+----------+-------+------------");
    for e in &view.entries {
        let state = match (&e.fault, e.executed) {
            (Some(_), _) => "fault",
            (None, true) => "done ",
            (None, false) => "wait ",
        };
        let mut line = format!("{:>5} | {:#08x} | {state} | {}", e.tag, e.pc, e.text);
        if e.executed {
            line.push_str(&format!("  -> {:#x}", e.result));
        }
        if let Some(fault) = &e.fault {
            line.push_str(&format!("  ({fault})"));
        }
        println!("{line}");
    }
}

/// Prints the load-store queue, oldest first.
pub fn print_lsq(cpu: &Cpu) {
    let view = cpu.lsq_view();
    if view.entries.is_empty() {
        println!("lsq: empty");
        return;
    }
    println!("tag   | op     | addr       | value      | flags");
    println!("------+--------+------------+------------+------");
    for e in &view.entries {
        let addr = e.addr.map(|a| format!("{a:#010x}")).unwrap_or_else(|| "?".into());
        let value = e.value.map(|v| format!("{v:#010x}")).unwrap_or_else(|| "?".into());
        let mut flags = String::new();
        if e.performed {
            flags.push('p');
        }
        if e.speculative {
            flags.push('s');
        }
        println!("{:>5} | {}{:<5} | {addr:>10} | {value:>10} | {flags}", e.tag, e.kind, e.width);
    }
}

/// Prints which lines the cache currently holds.
pub fn print_cache(cpu: &Cpu) {
    let view = cpu.cache_view();
    println!(
        "cache: {} sets x {} ways, {}-byte lines",
        view.sets, view.ways, view.line_size
    );
    if view.lines.is_empty() {
        println!("  (empty)");
        return;
    }
    for (set, way, base) in &view.lines {
        println!(
            "  set {set} way {way}: {base:#010x}..{:#010x}",
            base + view.line_size as u32
        );
    }
}

/// Prints the predictor tables.
pub fn print_predictor(cpu: &Cpu) {
    let view = cpu.predictor_view();
    let counters: Vec<String> = view.counters.iter().map(|c| c.to_string()).collect();
    println!("direction counters: [{}]", counters.join(" "));
    if view.btb.is_empty() {
        println!("btb: empty");
    } else {
        println!("btb:");
        for (pc, target) in &view.btb {
            println!("  {pc:#010x} -> {target:#010x}");
        }
    }
    if view.ras.is_empty() {
        println!("ras: empty");
    } else {
        let entries: Vec<String> = view.ras.iter().map(|a| format!("{a:#x}")).collect();
        println!("ras (oldest first): [{}]", entries.join(" "));
    }
}

/// Prints the fetch queue.
pub fn print_queue(cpu: &Cpu) {
    let pcs = cpu.fetch_queue_view();
    if pcs.is_empty() {
        println!("fetch queue: empty");
        return;
    }
    let entries: Vec<String> = pcs.iter().map(|pc| format!("{pc:#x}")).collect();
    println!("fetch queue: [{}]", entries.join(" "));
}

/// Dumps `count` words of memory starting at `addr` (no cache effects).
pub fn print_memory(cpu: &Cpu, addr: u32, count: u32) {
    for i in 0..count {
        let a = addr.wrapping_add(i * 4);
        let word = cpu.memory().peek_word(a);
        let bytes = word.to_bytes();
        let ascii: String = bytes
            .iter()
            .map(|b| if b.is_ascii_graphic() { *b as char } else { '.' })
            .collect();
        println!("{a:#010x}: {:#010x}  {ascii}", word.value());
    }
}
