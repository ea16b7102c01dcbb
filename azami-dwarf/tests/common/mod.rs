//! テスト用の合成DWARFセクションビルダー
//!
//! 実バイナリに依存せず、.debug_abbrevと.debug_infoのバイト列を
//! 手で組み立ててフィクスチャにする。

#![allow(dead_code)]

use azami_dwarf::encodings::{DwAt, DwForm, DwTag, DW_FORM_implicit_const, DW_UT_compile};

/// 小さなバイト列ビルダー（リトルエンディアン）
pub struct SectionBuilder {
    pub buf: Vec<u8>,
}

impl SectionBuilder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// 現在の書き込み位置
    pub fn offset(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// nバイトの符号なし整数
    pub fn uint(&mut self, v: u64, n: usize) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes()[..n]);
        self
    }

    pub fn uleb(&mut self, mut v: u64) -> &mut Self {
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            self.buf.push(byte);
            if v == 0 {
                return self;
            }
        }
    }

    pub fn sleb(&mut self, mut v: i64) -> &mut Self {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
            self.buf.push(if done { byte } else { byte | 0x80 });
            if done {
                return self;
            }
        }
    }

    pub fn cstr(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        self
    }

    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(b);
        self
    }

    /// 指定位置までゼロ埋めする
    pub fn pad_to(&mut self, offset: u64) -> &mut Self {
        assert!(self.buf.len() as u64 <= offset);
        self.buf.resize(offset as usize, 0);
        self
    }
}

/// .debug_abbrevのビルダー
pub struct AbbrevBuilder {
    buf: SectionBuilder,
}

impl AbbrevBuilder {
    pub fn new() -> Self {
        Self {
            buf: SectionBuilder::new(),
        }
    }

    /// 略語宣言を開始する
    pub fn begin(&mut self, code: u64, tag: DwTag, children: bool) -> &mut Self {
        self.buf.uleb(code);
        self.buf.uleb(tag.0 as u64);
        self.buf.u8(if children { 1 } else { 0 });
        self
    }

    pub fn attr(&mut self, at: DwAt, form: DwForm) -> &mut Self {
        self.buf.uleb(at.0 as u64);
        self.buf.uleb(form.0 as u64);
        self
    }

    /// implicit_constフォーム（値は略語側に埋め込まれる）
    pub fn attr_implicit(&mut self, at: DwAt, value: i64) -> &mut Self {
        self.buf.uleb(at.0 as u64);
        self.buf.uleb(DW_FORM_implicit_const.0 as u64);
        self.buf.sleb(value);
        self
    }

    /// 略語宣言を閉じる
    pub fn end_entry(&mut self) -> &mut Self {
        self.buf.u8(0);
        self.buf.u8(0);
        self
    }

    /// テーブルを閉じてバイト列を返す
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.u8(0);
        self.buf.buf
    }
}

/// DWARF 4ユニットヘッダのサイズ（initial length含む）
pub const UNIT_V4_HEADER: u64 = 4 + 2 + 4 + 1;
/// DWARF 5ユニットヘッダのサイズ（initial length含む）
pub const UNIT_V5_HEADER: u64 = 4 + 2 + 1 + 1 + 4;

/// DWARF 4（DWARF32）のユニットを組み立てる
pub fn unit_v4(address_size: u8, abbrev_offset: u32, dies: &[u8]) -> Vec<u8> {
    let mut b = SectionBuilder::new();
    // initial lengthは自分自身を含まない
    b.u32((UNIT_V4_HEADER - 4 + dies.len() as u64) as u32);
    b.u16(4);
    b.u32(abbrev_offset);
    b.u8(address_size);
    b.bytes(dies);
    b.buf
}

/// DWARF 5（DWARF32, DW_UT_compile）のユニットを組み立てる
pub fn unit_v5(address_size: u8, abbrev_offset: u32, dies: &[u8]) -> Vec<u8> {
    let mut b = SectionBuilder::new();
    b.u32((UNIT_V5_HEADER - 4 + dies.len() as u64) as u32);
    b.u16(5);
    b.u8(DW_UT_compile.0);
    b.u8(address_size);
    b.u32(abbrev_offset);
    b.bytes(dies);
    b.buf
}
