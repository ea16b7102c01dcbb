//! DWARF解析のエラー型

use crate::encodings::{DwForm, DwRle};
use thiserror::Error;

/// DWARF解析中に発生するエラー
///
/// すべてのエラーは呼び出し元まで伝播します。`containsAddress`の
/// `Unknown`は正常な結果でありエラーではありません。
#[derive(Debug, Error)]
pub enum DwarfError {
    /// リーダーがセクション終端を越えた、またはLEB128が不正
    #[error("bad encoding at offset {offset:#x}")]
    BadEncoding { offset: usize },

    /// 略語テーブルに存在しない略語コード
    #[error("unknown abbreviation code {code}")]
    UnknownAbbrev { code: u64 },

    /// デコーダが実装していないフォーム
    ///
    /// 黙って誤ったデコードを続けると後続のオフセットが壊れるため、
    /// フォームコードを保持して明示的に失敗します。
    #[error("unsupported form {form}")]
    UnsupportedForm { form: DwForm },

    /// 属性を互換性のない形に変換しようとした
    #[error("attribute form {form} does not match requested shape")]
    WrongForm { form: DwForm },

    /// GNU alternate参照が使われたが、alternateファイルが未設定
    #[error("no alt reference")]
    NoAltReference,

    /// レンジリスト内の未知のエントリ種別
    #[error("malformed range list entry {kind}")]
    RangeListMalformed { kind: DwRle },

    /// インデックス型のレンジリストエントリに必要な.debug_addrが無い
    #[error("range list entry {kind} needs .debug_addr, which is unavailable")]
    UnsupportedRngList { kind: DwRle },

    /// サポート外のDWARFバージョン
    #[error("unsupported DWARF version {version}")]
    UnsupportedVersion { version: u16 },

    /// 入力の破損またはデコーダのバグ
    #[error("invariant violated: {0}")]
    InvariantViolated(&'static str),

    /// ファイル読み込みエラー
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ELFパースエラー
    #[error("object parse error: {0}")]
    Object(#[from] object::read::Error),
}
