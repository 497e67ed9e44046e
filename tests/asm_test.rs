// End-to-end assembly checks against known machine words.

use asfv1::assembler::output::{write_bin, write_hex, PROGLEN};
use asfv1::assembler::{assemble, AssembleOptions};

fn options() -> AssembleOptions {
    AssembleOptions::default()
}

fn nopfill() -> AssembleOptions {
    AssembleOptions {
        nopfill: true,
        ..Default::default()
    }
}

fn assemble_words(source: &str, options: &AssembleOptions) -> Vec<u32> {
    let (program, _) = assemble(source, options).expect("assemble");
    program.words().to_vec()
}

fn first_word(source: &str) -> u32 {
    assemble_words(source, &options())[0]
}

fn assemble_err(source: &str, options: &AssembleOptions) -> String {
    assemble(source, options)
        .map(|_| ())
        .expect_err("expected failure")
        .to_string()
}

const SAMPLE: &str = "\
; A simple, but functional program
\tmem\tdelay\t19660
\tequ\tvol\treg0
start:\tskp\trun,main
\tldax\tpot0
\twrax\tvol,0
main:\tldax\tadcl
\tmulx\tvol
\twra\tdelay,0
\trda\tdelay^,0.5
\trda\tdelay#,0.5
\twrax\tdacl,0
";

#[test]
fn sample_program_binary_output_is_bit_exact() {
    let (program, report) = assemble(SAMPLE, &nopfill()).expect("assemble");
    assert_eq!(report.instructions(), 9);

    let mut bin = Vec::new();
    write_bin(&program, &mut bin).expect("write");
    assert_eq!(bin.len(), 512);

    let expected: [u8; 36] = [
        0x80, 0x40, 0x00, 0x11, 0x00, 0x00, 0x02, 0x05, 0x00, 0x00, 0x04, 0x06, 0x00, 0x00, 0x02,
        0x85, 0x00, 0x00, 0x04, 0x0a, 0x00, 0x00, 0x00, 0x02, 0x20, 0x04, 0xcc, 0xc0, 0x20, 0x09,
        0x99, 0x80, 0x00, 0x00, 0x02, 0xc6,
    ];
    assert_eq!(&bin[..36], &expected);
    for chunk in bin[36..].chunks(4) {
        assert_eq!(chunk, &[0x00, 0x00, 0x00, 0x11]);
    }
}

#[test]
fn empty_program_fill_policies() {
    let words = assemble_words("", &nopfill());
    assert_eq!(words.len(), PROGLEN);
    assert!(words.iter().all(|w| *w == 0x0000_0011));

    let words = assemble_words("", &options());
    assert_eq!(words.len(), PROGLEN);
    assert_eq!(words[0], (63 << 21) | 0x11);
    assert_eq!(words[64], (63 << 21) | 0x11);
    assert!(words
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 0 && *i != 64)
        .all(|(_, w)| *w == 0x0000_0011));
}

#[test]
fn or_literal_three_ways() {
    let expected = 0xC880_800F;
    assert_eq!(first_word("or -0.4335784912109375\n"), expected);
    assert_eq!(first_word("or 0xc88080\n"), expected);
    assert_eq!(first_word("or 1<<23|2**22|1<<19|2**15|1<<7\n"), expected);
}

#[test]
fn or_mask_equivalences() {
    assert_eq!(first_word("or -1\n"), first_word("or 0xffffff\n"));
    assert_eq!(
        first_word("or -1 & 0xffffff\n"),
        first_word("or 0xffffff\n")
    );
}

#[test]
fn caret_lexing() {
    let err = assemble_err("mem delay 1\nor delay^0xffff\n", &options());
    assert!(err.contains("Unexpected INTEGER"), "got: {err}");

    let parenthesized = assemble_words("mem delay 1\nor (delay)^0xffff\n", &options());
    let fused = assemble_words("mem delay 1\nor delay^^0xffff\n", &options());
    assert_eq!(parenthesized[0], fused[0]);
}

#[test]
fn case_insensitive_labels() {
    let reference = assemble_words("EQU Label_One -1.0\nOr LABEL_ONE\n", &options());
    for source in [
        "EQU Label_One -1.0\noR label_one\n",
        "equ LABEL_ONE -1.0\nOR lAbEl_OnE\n",
    ] {
        assert_eq!(assemble_words(source, &options())[0], reference[0]);
    }
}

#[test]
fn predefined_symbols_fold_case() {
    assert_eq!(first_word("mulx POT0\n"), first_word("mulx pot0\n"));
    assert_eq!(first_word("mulx PoT0\n"), first_word("mulx pot0\n"));
}

#[test]
fn fixup_offset_is_relative_to_next_instruction() {
    let words = assemble_words("skp neg,target\nclr\nclr\ntarget: clr\n", &options());
    // target at 3, skp at 0: offset 2.
    assert_eq!(words[0], (1 << 27) | (2 << 21) | 0x11);
}

#[test]
fn pseudo_op_bit_equivalences() {
    assert_eq!(first_word("clr\n"), first_word("and 0\n"));
    assert_eq!(first_word("not\n"), first_word("xor 0xffffff\n"));
    assert_eq!(first_word("absa\n"), first_word("maxx 0,0\n"));
    assert_eq!(first_word("nop\n"), first_word("skp 0,0\n"));
    assert_eq!(first_word("jmp 3\n"), first_word("skp 0,3\n"));
    assert_eq!(first_word("ldax reg4\n"), first_word("rdfx reg4,0\n"));
}

#[test]
fn spinreals_changes_literal_interpretation() {
    let plain = assemble_words("rdax reg0,1\n", &options());
    assert_eq!(plain[0], (1 << 16) | (0x20 << 5) | 0x04);

    let spin = AssembleOptions {
        spinreals: true,
        ..Default::default()
    };
    let promoted = assemble_words("rdax reg0,1\n", &spin);
    assert_eq!(promoted[0], (0x4000 << 16) | (0x20 << 5) | 0x04);
    assert_eq!(
        promoted[0],
        assemble_words("rdax reg0,1.0\n", &options())[0]
    );
}

#[test]
fn delay_allocator_boundaries() {
    assert!(assemble("mem a 32767\nmem b 0\n", &options()).is_ok());
    assert!(assemble_err("mem a 32768\n", &options()).contains("Invalid memory size"));
    assert!(assemble_err("mem a 32767\nmem b 1\n", &options()).contains("Delay exhausted"));
    assert!(assemble_err("mem a 20000\nmem b 12769\n", &options()).contains("Delay exhausted"));
}

#[test]
fn skip_boundaries() {
    let mut max_skip = String::from("skp 0,t\n");
    for _ in 0..63 {
        max_skip.push_str("clr\n");
    }
    max_skip.push_str("t: clr\n");
    let words = assemble_words(&max_skip, &options());
    assert_eq!(words[0], (63 << 21) | 0x11);

    let mut over = String::from("skp 0,t\n");
    for _ in 0..64 {
        over.push_str("clr\n");
    }
    over.push_str("t: clr\n");
    assert!(assemble_err(&over, &options()).contains("too large"));

    assert!(
        assemble_err("t: clr\nskp 0,t\n", &options()).contains("does not follow SKP")
    );
}

#[test]
fn strict_and_clamp_operand_policies() {
    assert!(assemble_err("sof 2.0,0.0\n", &options()).contains("out of range"));

    let clamp = AssembleOptions {
        clamp: true,
        ..Default::default()
    };
    let (program, report) = assemble("sof 2.0,0.0\n", &clamp).expect("clamped");
    assert_eq!(program.words()[0], (0x7fff << 16) | 0x0d);
    assert_eq!(report.warning_count(), 1);
    assert!(report.diagnostics()[0].message().contains("S1_14 arg clamped"));
}

#[test]
fn complex_expression_result_is_invalid() {
    assert!(assemble_err("equ j (-1)**(1/2)\n", &options()).contains("Invalid expression"));
}

#[test]
fn every_word_keeps_its_opcode_bits() {
    let cases: &[(&str, u32)] = &[
        ("rda 0,0\n", 0b00000),
        ("rmpa 0\n", 0b00001),
        ("wra 0,0\n", 0b00010),
        ("wrap 0,0\n", 0b00011),
        ("rdax reg0,0\n", 0b00100),
        ("rdfx reg0,0\n", 0b00101),
        ("ldax reg0\n", 0b00101),
        ("wrax reg0,0\n", 0b00110),
        ("wrhx reg0,0\n", 0b00111),
        ("wrlx reg0,0\n", 0b01000),
        ("maxx reg0,0\n", 0b01001),
        ("absa\n", 0b01001),
        ("mulx reg0\n", 0b01010),
        ("log 0,0\n", 0b01011),
        ("exp 0,0\n", 0b01100),
        ("sof 0,0\n", 0b01101),
        ("and 0\n", 0b01110),
        ("clr\n", 0b01110),
        ("or 0\n", 0b01111),
        ("xor 0\n", 0b10000),
        ("not\n", 0b10000),
        ("skp 0,0\n", 0b10001),
        ("jmp 0\n", 0b10001),
        ("nop\n", 0b10001),
        ("wlds sin0,0,0\n", 0b10010),
        ("wldr rmp0,0,0\n", 0b10010),
        ("jam rmp0\n", 0b10011),
        ("cho rdal,sin0\n", 0b10100),
    ];
    for (source, opcode) in cases {
        let word = first_word(source);
        assert_eq!(word & 0x1f, *opcode, "opcode mismatch for {source}");
    }
}

#[test]
fn hex_output_shifts_base_by_program_slot() {
    let (program, _) = assemble("clr\n", &nopfill()).expect("assemble");

    let mut slot0 = Vec::new();
    write_hex(&program, 0, &mut slot0).expect("hex");
    let text0 = String::from_utf8(slot0).expect("utf8");
    assert!(text0.starts_with(":100000000000000E"));
    assert!(text0.trim_end().ends_with(":00000001FF"));

    let mut slot3 = Vec::new();
    write_hex(&program, 3, &mut slot3).expect("hex");
    let text3 = String::from_utf8(slot3).expect("utf8");
    assert!(text3.starts_with(":10060000"));
    assert_eq!(text0.lines().count(), 33);
    assert_eq!(text3.lines().count(), 33);
}

#[test]
fn utf16_source_with_bom_assembles() {
    let mut raw = vec![0xFF, 0xFE];
    for b in "or 0xc88080\n".bytes() {
        raw.push(b);
        raw.push(0);
    }
    let decoded = asfv1::core::text_encoding::decode_source(&raw);
    assert_eq!(first_word(&decoded.text), 0xC880_800F);
}

#[test]
fn warnings_do_not_abort_assembly() {
    let (_, report) = assemble("equ x 1\nequ x 2\nor x\n", &options()).expect("assemble");
    assert_eq!(report.warning_count(), 1);
    assert_eq!(report.instructions(), 1);
}

#[test]
fn instruction_count_limit_is_enforced() {
    let mut source = String::new();
    for _ in 0..128 {
        source.push_str("clr\n");
    }
    assert!(assemble(&source, &options()).is_ok());
    source.push_str("clr\n");
    assert!(assemble_err(&source, &options()).contains("Max program exceeded"));
}
