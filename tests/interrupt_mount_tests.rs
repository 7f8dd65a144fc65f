//! Interrupt arriving while the system partition is being mounted

mod common;

use nix::sys::signal::Signal;

use common::{Fixture, ScriptedExecutor};
use pinc_provision::error::ProvisionError;
use pinc_provision::process_guard;
use pinc_provision::provisioner::Provisioner;

#[test]
fn test_interrupt_during_mount_unmounts_before_unmapping() {
    process_guard::init_signal_handlers().expect("install signal handlers");

    let fixture = Fixture::new();
    let executor = ScriptedExecutor::interrupted_on("mount /dev/mapper/loop0p2", Signal::SIGTERM);

    let err = Provisioner::new(&fixture.config, &executor)
        .provision(&fixture.image)
        .expect_err("interrupt should abort");

    assert!(matches!(err, ProvisionError::Interrupted(15)), "got {:?}", err);
    assert_eq!(err.exit_code(), 143);

    let root = fixture.root.display().to_string();
    assert_eq!(
        executor.command_lines(),
        vec![
            format!("kpartx -av {}", fixture.image),
            format!("mount /dev/mapper/loop0p2 {}", root),
            format!("umount {}", root),
            format!("kpartx -dv {}", fixture.image),
        ]
    );
}
