use emoji_cooccur::{normalize, KEYCAP, VS16};

/// `base + VS16` loses the selector: "®️" -> "®".
#[test]
fn variant_selector_is_dropped_from_single_codepoint() {
    assert_eq!(normalize("\u{00AE}\u{FE0F}"), "\u{00AE}");
    assert_eq!(normalize("❤\u{FE0F}"), "❤");
}

/// Keycaps keep the enclosing mark but not the selector: "3️⃣" -> "3\u{20e3}".
#[test]
fn keycap_keeps_enclosing_mark_only() {
    assert_eq!(normalize("3\u{FE0F}\u{20E3}"), "3\u{20E3}");
    assert_eq!(normalize("#\u{FE0F}\u{20E3}"), "#\u{20E3}");
    // Already without selector: untouched.
    assert_eq!(normalize("3\u{20E3}"), "3\u{20E3}");
}

/// Joined, skin-toned and flag sequences are opaque.
#[test]
fn other_clusters_pass_through() {
    let cases = [
        "😀",
        "🎉",
        "👍🏽",
        "👨\u{200D}👩\u{200D}👧",
        "🏳\u{FE0F}\u{200D}🌈",
        "🇺🇸",
        "❤\u{FE0F}\u{200D}🔥",
        "",
    ];
    for c in cases {
        assert_eq!(normalize(c), c, "{c:?} should be unchanged");
    }
}

/// normalize(normalize(c)) == normalize(c), including odd selector placements.
#[test]
fn normalization_is_idempotent() {
    let mut cases: Vec<String> = vec![
        "\u{00AE}\u{FE0F}".into(),
        "3\u{FE0F}\u{20E3}".into(),
        "3\u{20E3}".into(),
        "\u{FE0F}".into(),
        "\u{FE0F}\u{FE0F}".into(),
        "a\u{FE0F}\u{FE0F}".into(),
        "\u{FE0F}\u{20E3}".into(),
        "x\u{FE0F}\u{20E3}\u{FE0F}".into(),
        "👍🏽".into(),
        "👨\u{200D}👩\u{200D}👧".into(),
    ];
    // Every base from a small alphabet with every suffix shape.
    for base in ['1', '*', '©', '☺', '😀'] {
        for suffix in ["", "\u{FE0F}", "\u{20E3}", "\u{FE0F}\u{20E3}", "\u{20E3}\u{FE0F}"] {
            cases.push(format!("{base}{suffix}"));
        }
    }
    for c in &cases {
        let once = normalize(c);
        assert_eq!(normalize(&once), once, "not idempotent for {c:?}");
    }
}

#[test]
fn exported_constants_match_codepoints() {
    assert_eq!(VS16 as u32, 0xFE0F);
    assert_eq!(KEYCAP as u32, 0x20E3);
}
