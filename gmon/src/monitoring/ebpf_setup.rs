//! eBPF object loading and uprobe attachment
//!
//! Attaches one uretprobe to the goroutine-creation symbol and one uprobe to
//! the goroutine-exit symbol of the target executable. Attachment tries the
//! symbol name first; when the probe layer cannot use it (stripped symbol
//! table), the symbol's adjusted address from the ELF loader is used
//! instead, together with the optional PID filter.

use std::path::Path;

use aya::{
    programs::{uprobe::UProbeLinkId, UProbe},
    Ebpf,
};
use log::{debug, info, warn};

use crate::domain::MonitorError;
use crate::symbolization::SymbolTable;

/// (program name, target symbol); the creation probe is a uretprobe, which
/// is encoded in the program definition itself.
const GOROUTINE_PROBES: [(&str, &str); 2] =
    [("runtime_newproc1", "runtime.newproc1"), ("runtime_goexit1", "runtime.goexit1")];

/// Load the pre-built eBPF object (`cargo xtask build-ebpf --release`
/// produces it at the default path)
///
/// # Errors
/// Returns an error if the object cannot be read or the kernel rejects it
pub fn load_ebpf_program<P: AsRef<Path>>(object_path: P) -> Result<Ebpf, MonitorError> {
    let bpf = Ebpf::load_file(object_path)?;
    Ok(bpf)
}

/// Attach the goroutine lifecycle uprobes.
///
/// Returns the attached links so shutdown can detach them before the object
/// is unloaded. Failing to attach one probe is tolerated (logged); failing
/// both is fatal.
///
/// # Errors
/// Returns [`MonitorError::CannotAttach`] when no probe could be attached
pub fn attach_goroutine_uprobes(
    bpf: &mut Ebpf,
    symbols: &SymbolTable,
    target_path: &str,
    pid: Option<i32>,
) -> Result<Vec<(&'static str, UProbeLinkId)>, MonitorError> {
    let mut links = Vec::with_capacity(GOROUTINE_PROBES.len());

    for (program_name, symbol) in GOROUTINE_PROBES {
        let program: &mut UProbe = bpf
            .program_mut(program_name)
            .ok_or(MonitorError::ProgramNotFound { program: program_name })?
            .try_into()?;
        program.load()?;

        match program.attach(Some(symbol), 0, target_path, pid) {
            Ok(link) => {
                info!("attached uprobe symbol={symbol}");
                links.push((program_name, link));
                continue;
            }
            Err(e) => debug!("attach by symbol name failed symbol={symbol} error={e}"),
        }

        // Stripped binaries have no symbol table for the probe layer to
        // consult; fall back to the adjusted address from the ELF loader.
        let address = symbols.lookup_address(symbol);
        if address == 0 {
            warn!("could not resolve address for symbol={symbol}, probe not attached");
            continue;
        }
        match program.attach(None, address, target_path, pid) {
            Ok(link) => {
                info!("attached uprobe symbol={symbol} address={address:#x}");
                links.push((program_name, link));
            }
            Err(e) => warn!("could not attach uprobe symbol={symbol} address={address:#x}: {e}"),
        }
    }

    if links.is_empty() {
        return Err(MonitorError::CannotAttach { binary: target_path.to_string() });
    }
    Ok(links)
}

/// Detach all probe links, in reverse order of attachment, before the eBPF
/// object itself is dropped.
pub fn detach_goroutine_uprobes(bpf: &mut Ebpf, links: Vec<(&'static str, UProbeLinkId)>) {
    for (program_name, link) in links.into_iter().rev() {
        let program: Result<&mut UProbe, _> = match bpf.program_mut(program_name) {
            Some(program) => program.try_into(),
            None => continue,
        };
        match program {
            Ok(program) => {
                if let Err(e) = program.detach(link) {
                    warn!("failed to detach {program_name}: {e}");
                } else {
                    debug!("detached {program_name}");
                }
            }
            Err(e) => warn!("failed to detach {program_name}: {e}"),
        }
    }
}
