//! Critical data store behavior across resets

use exec_supervisor::Command;
use exec_types::{config, EsError, ResetSubtype, ResetType};
use services_cds::RegisterOutcome;
use tests_recovery::{boot, boot_with};

#[test]
fn test_registered_data_survives_processor_reset() {
    let mut exec = boot();
    let (_, handle) = exec.register_cds("A.Data", 16, false).unwrap();
    exec.copy_to_cds(handle, &[0xAB; 16]).unwrap();

    let (_, mut psp) = exec.into_parts();
    psp.set_reset_info(ResetType::Processor, ResetSubtype::Commanded);
    let mut exec = boot_with(psp);

    let (outcome, recovered) = exec.register_cds("A.Data", 16, false).unwrap();
    assert_eq!(outcome, RegisterOutcome::AlreadyExists);
    assert_eq!(recovered, handle);

    let mut out = [0u8; 16];
    exec.restore_from_cds(recovered, &mut out).unwrap();
    assert_eq!(out, [0xAB; 16]);
}

#[test]
fn test_smashed_region_comes_back_empty_but_usable() {
    let mut exec = boot();
    exec.register_cds("A.Data", 16, false).unwrap();

    let (_, mut psp) = exec.into_parts();
    // Destroy the begin sentinel; the next boot cannot trust the region
    psp.raw()[0] ^= 0xFF;
    let mut exec = boot_with(psp);

    assert!(exec.housekeeping().cds_available);
    assert_eq!(exec.housekeeping().cds_entries, 0);
    let (outcome, _) = exec.register_cds("A.Data", 16, false).unwrap();
    assert_eq!(outcome, RegisterOutcome::Created);
}

#[test]
fn test_delete_succeeds_once_owner_is_stopped() {
    let mut exec = boot();
    exec.register_cds("A.Data", 16, false).unwrap();

    // App A still holds a live slot: delete without force is refused
    let refused = exec.dispatch(Command::DeleteCds {
        name: "A.Data".to_string(),
        table: false,
        force: false,
    });
    assert_eq!(refused, Err(EsError::CdsOwnerActive));
    assert_eq!(exec.housekeeping().cds_entries, 1);

    // Stop the app and let the table scan free the slot
    exec.dispatch(Command::StopApp {
        name: "A".to_string(),
    })
    .unwrap();
    for _ in 0..config::APP_KILL_TIMEOUT {
        exec.periodic_step();
    }
    assert!(exec.lifecycle().app_id_by_name("A").is_none());

    exec.dispatch(Command::DeleteCds {
        name: "A.Data".to_string(),
        table: false,
        force: false,
    })
    .unwrap();
    assert_eq!(exec.housekeeping().cds_entries, 0);
}

#[test]
fn test_resize_across_reset_discards_old_contents() {
    let mut exec = boot();
    let (_, handle) = exec.register_cds("A.Data", 8, false).unwrap();
    exec.copy_to_cds(handle, &[1u8; 8]).unwrap();

    let (_, psp) = exec.into_parts();
    let mut exec = boot_with(psp);

    let (outcome, bigger) = exec.register_cds("A.Data", 32, false).unwrap();
    assert_eq!(outcome, RegisterOutcome::Resized);
    // A fresh block has no valid payload until the first write
    let mut out = [0u8; 32];
    assert!(exec.restore_from_cds(bigger, &mut out).is_err());
}
