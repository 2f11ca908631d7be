fn main() {
    if let Err(e) = npc_kill_timer_lib::run() {
        tracing::error!("Fatal: {:#}", e);
        eprintln!("npc-kill-timer: {:#}", e);
        std::process::exit(1);
    }
}
