#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

/// Region lookup with the acronyms of three states.
pub const UFS_CSV: &str = "SG_UF_NOT,SIGLA_UF,NOME_UF\n35,SP,Sao Paulo\n33,RJ,Rio de Janeiro\n31,MG,Minas Gerais\n";

/// Small notification export. Row 7 has an unknown state code.
pub fn cases_csv() -> String {
    let rows = [
        "1,35,10,2022-10-01,2022-10-11,F",
        "2,33,5,2022-10-15,2022-10-18,M",
        "3,35,10,2022-11-30,2022-12-05,F",
        "4,31,10,2022-12-01,2022-12-02,M",
        "5,33,10,2023-01-10,2023-01-30,F",
        "6,35,5,2023-02-01,,M",
        "7,99,10,2023-02-11,2023-02-12,F",
    ];
    let mut text = String::from("NU_NOTIFIC,SG_UF_NOT,CLASSI_FIN,DT_NOTIFIC,DT_ENCERRA,CS_SEXO\n");
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text
}

/// Expands a contingency table into one `(row label, column label)` line per
/// observation, as a two-column CSV.
pub fn table_to_csv(left: &str, right: &str, table: &[[u32; 4]; 4]) -> String {
    let mut text = format!("{left},{right}\n");
    for (i, row) in table.iter().enumerate() {
        for (j, count) in row.iter().enumerate() {
            for _ in 0..*count {
                text.push_str(&format!("r{i},c{j}\n"));
            }
        }
    }
    text
}
