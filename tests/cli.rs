use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

fn site() -> TempDir {
    let tmp = TempDir::new().expect("temp site");
    let root = tmp.path();
    fs::write(
        root.join("index.html"),
        "<!DOCTYPE html>\n<html>\n  <!-- nav -->\n  <head><link href=\"style.css\" rel=\"stylesheet\"></head>\n  <body class=\"used\">\n    <script src=\"script.js\"></script>\n  </body>\n</html>\n",
    )
    .unwrap();
    fs::write(
        root.join("style.css"),
        ".used { color: red; }\n.unused { color: blue; }\n",
    )
    .unwrap();
    fs::write(root.join("script.js"), "// boot\nconst start = 1;\nconsole.log(start);\n").unwrap();
    fs::create_dir_all(root.join("public/files")).unwrap();
    fs::write(root.join("public/files/cv.pdf"), "pdf").unwrap();
    tmp
}

#[test]
fn csp_prints_policy() {
    cargo_bin_cmd!("sitekit")
        .env("CONFIG", "")
        .arg("csp")
        .assert()
        .success()
        .stdout(contains("object-src 'none'"))
        .stdout(contains("upgrade-insecure-requests; block-all-mixed-content"))
        .stdout(contains("X-Frame-Options: DENY"))
        .stdout(contains(r#"<meta http-equiv="Content-Security-Policy""#));
}

#[test]
fn csp_json_is_parseable() {
    let output = cargo_bin_cmd!("sitekit")
        .env("CONFIG", "")
        .args(["csp", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(doc["header"]
        .as_str()
        .unwrap()
        .starts_with("default-src 'self'"));
    assert_eq!(doc["security_headers"]["X-Content-Type-Options"], "nosniff");
}

#[test]
fn build_then_compress() {
    let tmp = site();
    let root = tmp.path().to_str().unwrap();

    cargo_bin_cmd!("sitekit")
        .env("CONFIG", "")
        .args(["build", "--root", root])
        .assert()
        .success()
        .stdout(contains("BUILD OPTIMIZATION REPORT"));

    let dist = tmp.path().join("dist");
    let html = fs::read_to_string(dist.join("index.html")).unwrap();
    assert!(html.contains(r#"href="style.min.css""#));
    assert!(html.contains(r#"src="script.min.js""#));
    assert!(!html.contains("<!-- nav -->"));
    let css = fs::read_to_string(dist.join("style.min.css")).unwrap();
    assert!(css.contains(".used"));
    assert!(!css.contains(".unused"));
    assert!(dist.join("build-stats.json").is_file());
    assert!(dist.join("public/files/cv.pdf").is_file());

    cargo_bin_cmd!("sitekit")
        .env("CONFIG", "")
        .args(["compress", "--root", root])
        .assert()
        .success()
        .stdout(contains("TOTAL COMPRESSION"));
    for name in ["index.html", "style.min.css", "script.min.js"] {
        assert!(dist.join(format!("{name}.gz")).is_file());
        assert!(dist.join(format!("{name}.zst")).is_file());
    }
}

#[test]
fn config_env_sets_dist_dir() {
    let tmp = site();
    cargo_bin_cmd!("sitekit")
        .env(
            "CONFIG",
            format!(
                "source_dir = {:?}\ndist_dir = \"out\"\n",
                tmp.path().to_str().unwrap()
            ),
        )
        .arg("build")
        .assert()
        .success();
    assert!(tmp.path().join("out/style.min.css").is_file());
}

#[test]
fn build_without_sources_fails() {
    let tmp = TempDir::new().unwrap();
    cargo_bin_cmd!("sitekit")
        .env("CONFIG", "")
        .args(["build", "--root", tmp.path().to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn invalid_config_is_rejected() {
    cargo_bin_cmd!("sitekit")
        .env("CONFIG", "port = \"eighty\"")
        .arg("csp")
        .assert()
        .failure();
}
