// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for error taxonomy mapping

use super::*;

#[test]
fn taxonomy_mapping() {
    let name = WorkerName::new("dns");
    assert_eq!(
        ProcmanError::UnknownWorker(name.clone()).kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        ProcmanError::AlreadyRegistered(name.clone()).kind(),
        ErrorKind::Exists
    );
    assert_eq!(
        ProcmanError::Unkillable {
            name,
            action: "disable"
        }
        .kind(),
        ErrorKind::BadArg
    );
    assert_eq!(ProcmanError::DebugForbidden.kind(), ErrorKind::BadArg);
    assert_eq!(ProcmanError::NoStateDir.kind(), ErrorKind::Failed);
}
