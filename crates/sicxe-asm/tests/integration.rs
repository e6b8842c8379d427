//! Integration tests covering whole-program assembly.

use sicxe_asm::{
    decode_format34, AddrMode, AddressingConfig, AsmConfig, AsmError, Assembler, ErrorKind, Line,
    ObjectConfig,
};

const COPY_SRC: &str = include_str!("fixtures/copy.asm");
const COPY_OBJ: &str = include_str!("fixtures/copy.obj");

fn assemble(src: &str) -> (Assembler, Result<sicxe_asm::ObjectProgram, AsmError>) {
    let mut asm = Assembler::new();
    let result = asm.assemble_source(src);
    (asm, result)
}

/// The textbook COPY program needs direct format-4 addresses and absolute
/// EQU symbols placed as values.
fn assemble_relocating(src: &str) -> (Assembler, Result<sicxe_asm::ObjectProgram, AsmError>) {
    let config = AsmConfig {
        addressing: AddressingConfig {
            extended_direct: true,
            relocatable_operands: true,
        },
        ..Default::default()
    };
    let mut asm = Assembler::with_config(config);
    let result = asm.assemble_source(src);
    (asm, result)
}

// ---------------------------------------------------------------------------
//  Full program
// ---------------------------------------------------------------------------

#[test]
fn test_copy_program_object() {
    let (_, result) = assemble_relocating(COPY_SRC);
    let program = result.unwrap();
    assert_eq!(program.to_string(), COPY_OBJ);
}

#[test]
fn test_copy_program_tables() {
    let (asm, result) = assemble_relocating(COPY_SRC);
    result.unwrap();

    let st = asm.symbols();
    assert_eq!(st.address("RETADR"), Some(0x30));
    assert_eq!(st.address("LENGTH"), Some(0x33));
    assert_eq!(st.address("BUFFER"), Some(0x36));
    assert_eq!(st.address("RDREC"), Some(0x1036));
    assert_eq!(st.address("WRREC"), Some(0x105D));
    let maxlen = st.lookup("MAXLEN").unwrap();
    assert_eq!(maxlen.value, 4096);
    assert!(maxlen.is_equ && !maxlen.relative);

    assert_eq!(asm.literals().lookup("=C'EOF'").unwrap().address, 0x2D);
    assert_eq!(asm.literals().lookup("=X'05'").unwrap().address, 0x1076);
    assert_eq!(asm.base(), Some(0x33));
}

#[test]
fn test_copy_program_addressing_flags() {
    let (asm, result) = assemble_relocating(COPY_SRC);
    result.unwrap();
    let code = asm.object_code().unwrap();
    let index_of = |label: &str| {
        asm.lines()
            .iter()
            .position(|l| l.label == label)
            .unwrap()
    };

    // STCH BUFFER,X → base-relative, indexed.
    let stch = asm
        .lines()
        .iter()
        .position(|l| l.mnemonic == "STCH")
        .unwrap();
    let flags = code.addressing[&stch].flags;
    assert!(flags.x && flags.b && !flags.p);

    // EXIT STX LENGTH → base-relative, disp 0.
    let exit = code.addressing[&index_of("EXIT")];
    assert!(exit.flags.b);
    assert_eq!(exit.disp, 0);

    // CLOOP +JSUB RDREC → extended, direct address.
    let cloop = code.addressing[&index_of("CLOOP")];
    assert_eq!(cloop.flags.bpe_bits(), 0b001);
    assert_eq!(cloop.disp_hex(), "01036");
}

#[test]
fn test_copy_program_needs_direct_addresses() {
    let (asm, result) = assemble(COPY_SRC);
    assert_eq!(
        result.unwrap_err(),
        AsmError::DisplacementOverflow {
            line: 6,
            operand: "RDREC".into()
        }
    );
    assert!(asm.object_code().is_none());
    // Pass 1 tables are still complete.
    assert_eq!(asm.symbols().address("RDREC"), Some(0x1036));
}

// ---------------------------------------------------------------------------
//  Addressing scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_extended_operand_beyond_base_reach() {
    let src = "\
P        START   0
         BASE    ANCHOR
ANCHOR   +LDA    FAR
         RESB    8000
FAR      WORD    1
         END     P
";
    let (asm, result) = assemble(src);
    assert_eq!(
        result.unwrap_err(),
        AsmError::DisplacementOverflow {
            line: 3,
            operand: "FAR".into()
        }
    );
    assert_eq!(asm.error_at(2), Some(ErrorKind::DisplacementOverflow));

    // With direct format-4 addresses enabled the field holds FAR itself.
    let (asm, result) = assemble_relocating(src);
    let program = result.unwrap();
    assert_eq!(&program.texts[0].data[..4], &[0x03, 0x10, 0x1F, 0x44]);
    assert_eq!(asm.object_code().unwrap().addressing[&2].flags.bpe_bits(), 0b001);
}

#[test]
fn test_equ_symbol_is_addressed_like_a_label() {
    let src = "\
P        START   0
TEN      EQU     10
         LDA     TEN
         END     P
";
    let (asm, result) = assemble(src);
    let program = result.unwrap();
    assert_eq!(program.texts[0].data, vec![0x03, 0x20, 0x07]);
    assert!(asm.object_code().unwrap().addressing[&2].flags.p);

    // As an absolute symbol it becomes a plain value.
    let (_, result) = assemble_relocating(src);
    assert_eq!(result.unwrap().texts[0].data, vec![0x03, 0x00, 0x0A]);
}

#[test]
fn test_expression_operand_is_a_value() {
    let src = "\
P        START   0
         LDA     BUF+3
BUF      RESB    8
         END     P
";
    let (asm, result) = assemble(src);
    let program = result.unwrap();
    // BUF+3 = 6 goes into the field with b = p = 0.
    assert_eq!(program.texts[0].data, vec![0x03, 0x00, 0x06]);
    assert_eq!(asm.object_code().unwrap().addressing[&1].flags.bpe_bits(), 0);

    // As a relative expression it is reached PC-relative: 6 - 3.
    let (_, result) = assemble_relocating(src);
    assert_eq!(result.unwrap().texts[0].data, vec![0x03, 0x20, 0x03]);
}

#[test]
fn test_pc_relative_ten_bytes_ahead() {
    let src = "\
P        START   0000
         LDA     TARGET
         RESB    7
TARGET   WORD    1
         END     P
";
    let (asm, result) = assemble(src);
    let program = result.unwrap();
    let addr = asm.object_code().unwrap().addressing[&1];
    assert!(addr.flags.p && !addr.flags.b && !addr.flags.e);
    assert_eq!(addr.disp_hex(), "007");
    assert_eq!(&program.texts[0].data[..3], &[0x03, 0x20, 0x07]);
}

#[test]
fn test_base_fallback_boundaries() {
    // target - base = 4095 succeeds, 4096 fails.
    let ok = "\
P        START   0
         BASE    ANCHOR
ANCHOR   LDA     EDGE
         RESB    4092
EDGE     WORD    0
         END     P
";
    let (asm, result) = assemble(ok);
    result.unwrap();
    let addr = asm.object_code().unwrap().addressing[&2];
    assert!(addr.flags.b && !addr.flags.p);
    assert_eq!(addr.disp, 4095);

    let bad = ok.replace("RESB    4092", "RESB    4093");
    let (asm, result) = assemble(&bad);
    assert!(matches!(result, Err(AsmError::DisplacementOverflow { .. })));
    assert_eq!(asm.error_at(2), Some(ErrorKind::DisplacementOverflow));
}

#[test]
fn test_numeric_operand_out_of_field_range() {
    let (asm, result) = assemble("P        START   0\n         LDA     #4096\n         END     P\n");
    assert!(matches!(result, Err(AsmError::DisplacementOverflow { line: 2, .. })));
    assert_eq!(asm.error_at(1), Some(ErrorKind::DisplacementOverflow));
    let (_, result) = assemble("P        START   0\n         +LDA    #4096\n         END     P\n");
    assert!(result.is_ok());
}

#[test]
fn test_encoded_instructions_decode() {
    let (asm, result) = assemble_relocating(COPY_SRC);
    result.unwrap();
    let code = asm.object_code().unwrap();
    for (&idx, addressing) in &code.addressing {
        let bytes = code.line_bytes(idx);
        let width = if addressing.flags.e { 4 } else { 3 };
        let (opcode, decoded) = decode_format34(&bytes[..width]).unwrap();
        let def = asm.catalog().lookup(&asm.lines()[idx].mnemonic).unwrap();
        assert_eq!(opcode, def.opcode);
        assert_eq!(&decoded, addressing);
    }
}

// ---------------------------------------------------------------------------
//  Data directives and records
// ---------------------------------------------------------------------------

#[test]
fn test_byte_constants() {
    let src = "\
P        START   0
         BYTE    X'1F'
         BYTE    C'EOF'
         END     P
";
    let (asm, result) = assemble(src);
    let program = result.unwrap();
    assert_eq!(asm.object_code().unwrap().record_lengths(), vec![1, 3]);
    assert_eq!(program.records()[1], "T^000000^04^1F454F46");
}

#[test]
fn test_thirty_five_bytes_make_two_records() {
    let mut src = String::from("P        START   1000\n");
    for _ in 0..7 {
        src.push_str("         BYTE    C'ABCDE'\n");
    }
    src.push_str("         END     P\n");
    let (_, result) = assemble(&src);
    let program = result.unwrap();
    assert_eq!(program.text_lengths(), vec![30, 5]);
    assert_eq!(program.texts[0].address, 0x1000);
    assert_eq!(program.texts[1].address, 0x1000 + 30);
    assert_eq!(program.header.size, 34);
}

#[test]
fn test_reserves_count_toward_size_not_records() {
    let src = "\
P        START   0
         WORD    1
         RESW    2
         WORD    2
         END     P
";
    let (_, result) = assemble(src);
    let program = result.unwrap();
    assert_eq!(program.texts.len(), 1);
    assert_eq!(program.texts[0].data.len(), 6);
    assert_eq!(program.header.size, 6 + 6 - 1);
}

#[test]
fn test_custom_record_layout() {
    let config = AsmConfig {
        object: ObjectConfig {
            text_record_limit: 3,
            separator: ' ',
        },
        ..Default::default()
    };
    let mut asm = Assembler::with_config(config);
    let program = asm
        .assemble_source("P        START   0\n         WORD    1,2\n         END     P\n")
        .unwrap();
    assert_eq!(
        program.records(),
        vec![
            "H P      000000 000005",
            "T 000000 03 000001",
            "T 000003 03 000002",
            "E 000000",
        ]
    );
}

#[test]
fn test_configured_instruction() {
    let config = AsmConfig::from_toml_str(
        "[[instructions]]\nmnemonic = \"HALT\"\nopcode = 0xF5\nformat = 1\n",
    )
    .unwrap();
    let mut asm = Assembler::with_config(config);
    let program = asm
        .assemble_source("P        START   0\n         HALT\n         END     P\n")
        .unwrap();
    assert_eq!(program.texts[0].data, vec![0xF5]);
}

// ---------------------------------------------------------------------------
//  Literals
// ---------------------------------------------------------------------------

#[test]
fn test_literal_emitted_once() {
    let src = "\
P        START   0
         LDA     =W'7'
         STA     =W'7'
         LDA     =W'7'
         END     P
";
    let (asm, result) = assemble(src);
    let program = result.unwrap();
    assert_eq!(asm.literals().len(), 1);
    assert_eq!(asm.literals().lookup("=W'7'").unwrap().address, 9);
    let bytes = &program.texts[0].data;
    assert_eq!(bytes.len(), 12);
    assert_eq!(&bytes[9..], &[0x00, 0x00, 0x07]);
}

#[test]
fn test_literal_pools_follow_their_code() {
    let src = "\
P        START   100
         LDA     =X'AA'
         LTORG
         LTORG
         LDA     =X'BB'
         END     P
";
    let (asm, result) = assemble(src);
    result.unwrap();
    let lits = asm.literals();
    assert_eq!(lits.lookup("=X'AA'").unwrap().address, 0x103);
    // The second LTORG has nothing new to place.
    assert_eq!(lits.pool(1).count(), 0);
    assert_eq!(lits.lookup("=X'BB'").unwrap().address, 0x107);
    assert_eq!(lits.lookup("=X'BB'").unwrap().pool, 2);
}

// ---------------------------------------------------------------------------
//  Errors
// ---------------------------------------------------------------------------

#[test]
fn test_equ_forward_reference() {
    let src = "\
P        START   0
SIZE     EQU     TAIL-HEAD
HEAD     RESB    4
TAIL     EQU     *
         END     P
";
    let (asm, result) = assemble(src);
    assert_eq!(result.unwrap_err(), AsmError::PassOne { count: 1 });
    assert_eq!(asm.error_at(1), Some(ErrorKind::WrongOperandType));
    assert_eq!(
        asm.diagnostics(),
        vec![AsmError::WrongOperandType {
            line: 2,
            operand: "TAIL-HEAD".into()
        }]
    );
}

#[test]
fn test_pass_two_failure_keeps_pass_one_tables() {
    let src = "\
P        START   0
         LDA     FAR
         RESB    5000
FAR      WORD    1
         END     P
";
    let (asm, result) = assemble(src);
    assert_eq!(
        result.unwrap_err(),
        AsmError::DisplacementOverflow {
            line: 2,
            operand: "FAR".into()
        }
    );
    assert_eq!(asm.symbols().address("FAR"), Some(5003));
    assert!(asm.object_code().is_none());
}

#[test]
fn test_assemble_tokenized_lines() {
    let lines = vec![
        Line::new("START", "0").labeled("P"),
        Line::new("LDA", "5").with_mode(AddrMode::Immediate),
        Line::new("END", "P"),
    ];
    let mut asm = Assembler::new();
    let program = asm.assemble(lines).unwrap();
    assert_eq!(program.texts[0].data, vec![0x01, 0x00, 0x05]);
    assert_eq!(asm.lines()[2].number, 3);
}

#[test]
fn test_program_beyond_address_space() {
    let src = "\
P        START   FFFFFFFF
         BYTE    X'01'
         END     P
";
    let (asm, result) = assemble(src);
    assert_eq!(result.unwrap_err(), AsmError::PassOne { count: 1 });
    assert_eq!(
        asm.diagnostics(),
        vec![AsmError::WrongOperandType {
            line: 1,
            operand: "FFFFFFFF".into()
        }]
    );
}

#[test]
fn test_non_ascii_hex_digits_rejected() {
    let (asm, result) = assemble("P        START   0\n         BYTE    X'\u{e9}1'\n         END     P\n");
    assert_eq!(result.unwrap_err(), AsmError::PassOne { count: 1 });
    assert_eq!(asm.error_at(1), Some(ErrorKind::WrongOperandType));
}
