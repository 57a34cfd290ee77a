#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_core::snapshot::Snapshot;
use tally_core::store::StoreData;

fuzz_target!(|data: &[u8]| {
    let Ok(state) = serde_json::from_slice::<StoreData>(data) else {
        return;
    };
    let snapshot = Snapshot::from_data(&state);
    let encoded = serde_json::to_vec(&snapshot).expect("snapshot serializes");
    let decoded: Snapshot = serde_json::from_slice(&encoded).expect("snapshot reparses");
    assert_eq!(decoded.contributions, snapshot.contributions);
    assert_eq!(decoded.quotas, snapshot.quotas);
});
