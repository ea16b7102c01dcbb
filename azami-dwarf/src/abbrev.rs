//! 略語テーブル
//!
//! .debug_abbrevセクションから、ユニット単位の略語コード →
//! (タグ, 子の有無, フォーム列) の対応表を構築します。ユニットの
//! ロード時に一度だけ構築され、以後は読み取り専用です。

use std::collections::HashMap;
use std::rc::Rc;

use crate::encodings::{DwAt, DwForm, DwTag, DW_AT_sibling, DW_FORM_implicit_const};
use crate::errors::DwarfError;
use crate::reader::DwarfReader;
use crate::Result;

/// 略語のフォームエントリ1つ分
///
/// `value`は`DW_FORM_implicit_const`のときだけ意味を持ちます
/// （値が略語宣言側に埋め込まれる）。
#[derive(Debug, Clone)]
pub struct FormEntry {
    pub attr: DwAt,
    pub form: DwForm,
    pub value: i64,
}

/// 同一略語コードを持つDIE群が共有するスキーマ
#[derive(Debug)]
pub struct Abbreviation {
    pub tag: DwTag,
    pub has_children: bool,
    /// 宣言順のフォーム列。DIEの値列と同じ個数・同じ順序
    pub forms: Vec<FormEntry>,
    /// 属性名 → フォーム列内の位置
    pub attr_index: HashMap<DwAt, usize>,
    /// DW_AT_siblingフォームの位置（あれば）。兄弟スキップに使う
    pub sibling_idx: Option<usize>,
}

/// ユニット1つ分の略語テーブル
#[derive(Debug, Default)]
pub struct AbbrevTable {
    entries: HashMap<u64, Rc<Abbreviation>>,
}

impl AbbrevTable {
    /// .debug_abbrevの指定オフセットからテーブルを構築する
    pub fn parse(data: &[u8], table_offset: u64) -> Result<Self> {
        let mut r = DwarfReader::new(data, table_offset as usize);
        let mut entries = HashMap::new();

        loop {
            let code = r.read_uleb128()?;
            if code == 0 {
                break;
            }
            let tag = DwTag(r.read_uleb128()? as u16);
            let has_children = r.read_u8()? != 0;

            let mut forms = Vec::new();
            let mut attr_index = HashMap::new();
            let mut sibling_idx = None;
            loop {
                let attr = r.read_uleb128()?;
                let form = DwForm(r.read_uleb128()? as u16);
                if attr == 0 && form.0 == 0 {
                    break;
                }
                let value = if form == DW_FORM_implicit_const {
                    r.read_sleb128()?
                } else {
                    0
                };
                let attr = DwAt(attr as u16);
                if attr == DW_AT_sibling {
                    sibling_idx = Some(forms.len());
                }
                attr_index.insert(attr, forms.len());
                forms.push(FormEntry { attr, form, value });
            }

            entries.insert(
                code,
                Rc::new(Abbreviation {
                    tag,
                    has_children,
                    forms,
                    attr_index,
                    sibling_idx,
                }),
            );
        }

        Ok(Self { entries })
    }

    /// 略語コードから略語を引く
    pub fn find(&self, code: u64) -> Result<Rc<Abbreviation>> {
        self.entries
            .get(&code)
            .cloned()
            .ok_or(DwarfError::UnknownAbbrev { code })
    }
}
