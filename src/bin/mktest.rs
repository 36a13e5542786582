/// mktest — generate deterministic test data under testdata/
///
/// Run with: cargo run --bin mktest
///
/// Wipes and recreates testdata/ from scratch. Sizes are chosen around the
/// default 4 MiB breakpoint so a run exercises every weight class:
///   empty files              — weight 1
///   small text files         — weight 1
///   exactly 4 MiB            — weight 1
///   4 MiB + 1 byte           — weight 2
///   12 MiB                   — weight 3
///
/// Symlink layout (Unix only):
///   testdata/links/alpha_link -> ../alpha
///   testdata/links/dangling   -> ../nowhere
///   Used to test --follow-symlinks behaviour.

use std::fs;
use std::io::Write;
use std::path::Path;

const MIB: usize = 1024 * 1024;

fn main() {
    let root = Path::new("testdata");

    // Wipe and recreate
    if root.exists() {
        fs::remove_dir_all(root).expect("remove testdata");
    }
    fs::create_dir_all(root).expect("create testdata");

    // ── alpha/ ────────────────────────────────────────────────────────────────
    let alpha = root.join("alpha");
    fs::create_dir_all(&alpha).unwrap();
    write_file(&alpha.join("empty.txt"), b"");
    write_file(&alpha.join("abc.txt"), b"abc");

    let alpha_nested = alpha.join("nested");
    fs::create_dir_all(&alpha_nested).unwrap();
    write_file(&alpha_nested.join("hello.txt"), b"hello world\n");
    write_file(&alpha_nested.join("empty_again.txt"), b"");

    // ── sized/ ────────────────────────────────────────────────────────────────
    let sized = root.join("sized");
    fs::create_dir_all(&sized).unwrap();
    write_file(&sized.join("exact_4m.bin"), &pattern(4 * MIB));
    write_file(&sized.join("over_4m.bin"), &pattern(4 * MIB + 1));
    write_file(&sized.join("twelve_m.bin"), &pattern(12 * MIB));

    // ── hidden/ ───────────────────────────────────────────────────────────────
    let hidden = root.join("hidden");
    fs::create_dir_all(&hidden).unwrap();
    write_file(&hidden.join(".dotfile"), b"hidden\n");
    write_file(&hidden.join("visible.txt"), b"visible only\n");

    // ── links/ ────────────────────────────────────────────────────────────────
    let links = root.join("links");
    fs::create_dir_all(&links).unwrap();
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink("../alpha", links.join("alpha_link"))
            .unwrap_or_else(|e| eprintln!("warning: could not create symlink: {e}"));
        std::os::unix::fs::symlink("../nowhere", links.join("dangling"))
            .unwrap_or_else(|e| eprintln!("warning: could not create symlink: {e}"));
    }

    // ── Summary ───────────────────────────────────────────────────────────────
    println!("Test data created under testdata/");
    println!();
    println!("Expected output (default options): 8 lines");
    println!("  abc.txt   900150983cd24fb0d6963f7d28e17f72 (md5)");
    println!("  empty     d41d8cd98f00b204e9800998ecf8427e (md5)");
    println!();
    println!("Test commands:");
    println!("  cargo run -- hash testdata");
    println!("  cargo run -- hash testdata --hidden --follow-symlinks");
    println!("  cargo run -- -v hash testdata --buffer-size 1048576 --latency 0.004");
    println!("  cargo run -- profile --throughput 150000000 --latency 0.012");
}

/// Deterministic filler content.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn write_file(path: &Path, content: &[u8]) {
    let mut f = fs::File::create(path)
        .unwrap_or_else(|e| panic!("create {}: {}", path.display(), e));
    f.write_all(content)
        .unwrap_or_else(|e| panic!("write {}: {}", path.display(), e));
}
