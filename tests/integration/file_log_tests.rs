//! `AppendFile` against a real filesystem: sessions append, never truncate.

use std::path::PathBuf;

use fluidsampler::adapters::file_log::AppendFile;
use fluidsampler::app::control_loop::ControlLoop;
use fluidsampler::app::ports::LogStorage;
use fluidsampler::datalog::{LogRecord, RecordKind};

use crate::mock_hw::{MockRig, NoDelay, test_config};

fn scratch(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "fluidsampler-it-{}-{name}",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path
}

#[test]
fn reopening_preserves_prior_content() {
    let path = scratch("append.txt");
    std::fs::write(&path, "0,BOOT,v0.0.1\n").unwrap();

    let mut file = AppendFile::open(&path).unwrap();
    assert_eq!(file.path(), path.as_path());
    file.append(b"1,SAMPLE,1200,20.0\n").unwrap();
    file.flush().unwrap();
    drop(file);

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, "0,BOOT,v0.0.1\n1,SAMPLE,1200,20.0\n");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn two_sessions_share_one_log() {
    let path = scratch("sessions.txt");

    for _ in 0..2 {
        let mut storage = AppendFile::open(&path).unwrap();
        let mut rig = MockRig::new();
        rig.set_level(20.0);
        let mut control = ControlLoop::new(test_config()).unwrap();
        control.start(&mut storage, &mut NoDelay);
        for _ in 0..3 {
            control.tick(&mut rig, &mut storage, &mut NoDelay);
        }
        control.shutdown(&mut rig, &mut storage, &mut NoDelay).unwrap();
    }

    let text = std::fs::read_to_string(&path).unwrap();
    let records: Vec<LogRecord> = text
        .lines()
        .map(|l| LogRecord::parse_line(l).unwrap())
        .collect();
    assert_eq!(records.len(), 8);
    let boots: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.kind() == RecordKind::Boot)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(boots, vec![0, 4]);
    let _ = std::fs::remove_file(&path);
}
