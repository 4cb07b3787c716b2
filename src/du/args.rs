//! 模板迭代参数
//!
//! 每个参数由一个迭代规格描述（整数序列、字符串序列或 simple-for 等差
//! 序列）。[`TmplArgs`] 保存规格及当前取值，每次 [`TmplArgs::iterate`]
//! 推进最右边的参数，回绕时向左进位，全部回绕即结束。

use tracing::trace;

use crate::asn::AsnValue;
use crate::error::{Result, TadError};

pub const SIMPLE_FOR_BEGIN_DEFAULT: i32 = 1;
pub const SIMPLE_FOR_STEP_DEFAULT: i32 = 1;

/// 一次迭代中某个参数的取值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TmplArg {
    Int(i32),
    Str(String),
    Oct(Vec<u8>),
}

impl TmplArg {
    /// 取值的字节长度
    pub fn len(&self) -> usize {
        match self {
            TmplArg::Int(_) => std::mem::size_of::<i32>(),
            TmplArg::Str(s) => s.len(),
            TmplArg::Oct(o) => o.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            TmplArg::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// 参数迭代规格
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterSpec {
    Ints(Vec<i32>),
    /// 与左邻参数同步推进，不单独构成一个维度
    IntsAssoc(Vec<i32>),
    Strings(Vec<String>),
    SimpleFor { begin: i32, end: i32, step: i32 },
}

impl IterSpec {
    pub fn simple_for(end: i32) -> Self {
        IterSpec::SimpleFor {
            begin: SIMPLE_FOR_BEGIN_DEFAULT,
            end,
            step: SIMPLE_FOR_STEP_DEFAULT,
        }
    }

    /// 从 NDS 的一个迭代规格（CHOICE）解析
    pub fn from_asn(spec: &AsnValue) -> Result<Self> {
        let (label, v) = spec
            .as_choice()
            .ok_or_else(|| TadError::wrong_nds("argument spec must be a choice"))?;
        let ints = |v: &AsnValue| -> Result<Vec<i32>> {
            let items = v
                .items()
                .ok_or_else(|| TadError::wrong_nds(format!("'{label}' expects a list")))?;
            items
                .iter()
                .map(|i| {
                    i.as_int()
                        .and_then(|n| i32::try_from(n).ok())
                        .ok_or_else(|| TadError::wrong_nds(format!("'{label}' item is not int32")))
                })
                .collect()
        };
        let spec = match label {
            "ints" => IterSpec::Ints(ints(v)?),
            "ints-assoc" => IterSpec::IntsAssoc(ints(v)?),
            "strings" => {
                let items = v
                    .items()
                    .ok_or_else(|| TadError::wrong_nds("'strings' expects a list"))?;
                let strs = items
                    .iter()
                    .map(|i| {
                        i.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| TadError::wrong_nds("'strings' item is not a string"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                IterSpec::Strings(strs)
            }
            "simple-for" => {
                let field = |name: &str| -> Result<Option<i32>> {
                    match v.field(name).and_then(AsnValue::as_int) {
                        Some(n) => i32::try_from(n)
                            .map(Some)
                            .map_err(|_| TadError::wrong_nds(format!("simple-for {name} out of range"))),
                        None => Ok(None),
                    }
                };
                let end = field("end")?
                    .ok_or_else(|| TadError::wrong_nds("simple-for has no default for 'end'"))?;
                IterSpec::SimpleFor {
                    begin: field("begin")?.unwrap_or(SIMPLE_FOR_BEGIN_DEFAULT),
                    end,
                    step: field("step")?.unwrap_or(SIMPLE_FOR_STEP_DEFAULT),
                }
            }
            other => {
                return Err(TadError::unsupported(format!("argument spec '{other}'")));
            }
        };
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<()> {
        match self {
            IterSpec::Ints(v) | IterSpec::IntsAssoc(v) if v.is_empty() => {
                Err(TadError::wrong_nds("empty integer sequence"))
            }
            IterSpec::Strings(v) if v.is_empty() => Err(TadError::wrong_nds("empty string sequence")),
            IterSpec::SimpleFor { step, .. } if *step <= 0 => {
                Err(TadError::wrong_nds(format!("simple-for step {step} must be positive")))
            }
            _ => Ok(()),
        }
    }

    fn first(&self) -> TmplArg {
        match self {
            IterSpec::Ints(v) | IterSpec::IntsAssoc(v) => TmplArg::Int(v.first().copied().unwrap_or_default()),
            IterSpec::Strings(v) => TmplArg::Str(v.first().cloned().unwrap_or_default()),
            IterSpec::SimpleFor { begin, .. } => TmplArg::Int(*begin),
        }
    }
}

/// 迭代一步的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterStep {
    Advanced,
    Finished,
}

/// 迭代参数集合：规格、各参数的当前下标与当前取值
#[derive(Debug, Clone, Default)]
pub struct TmplArgs {
    specs: Vec<IterSpec>,
    index: Vec<usize>,
    args: Vec<TmplArg>,
}

impl TmplArgs {
    /// 校验规格并设置第一组取值
    pub fn init(specs: Vec<IterSpec>) -> Result<Self> {
        for spec in &specs {
            spec.validate()?;
        }
        let args = specs.iter().map(IterSpec::first).collect();
        let index = vec![0; specs.len()];
        Ok(Self { specs, index, args })
    }

    /// 从模板的 `arg-sets` 字段解析并初始化；无该字段时参数为空
    pub fn from_nds(arg_sets: Option<&AsnValue>) -> Result<Self> {
        let specs = match arg_sets {
            None => Vec::new(),
            Some(v) => v
                .items()
                .ok_or_else(|| TadError::wrong_nds("'arg-sets' must be a list"))?
                .iter()
                .map(IterSpec::from_asn)
                .collect::<Result<Vec<_>>>()?,
        };
        Self::init(specs)
    }

    pub fn args(&self) -> &[TmplArg] {
        &self.args
    }

    pub fn specs(&self) -> &[IterSpec] {
        &self.specs
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// 推进到下一组取值
    pub fn iterate(&mut self) -> IterStep {
        for dep in (0..self.specs.len()).rev() {
            let performed = match &self.specs[dep] {
                IterSpec::SimpleFor { begin, end, step } => {
                    let cur = self.args[dep].as_int().unwrap_or(*begin);
                    match cur.checked_add(*step) {
                        Some(next) if next <= *end => {
                            self.args[dep] = TmplArg::Int(next);
                            true
                        }
                        _ => {
                            self.args[dep] = TmplArg::Int(*begin);
                            false
                        }
                    }
                }
                IterSpec::Ints(v) | IterSpec::IntsAssoc(v) => {
                    let next = (self.index[dep] + 1) % v.len();
                    self.index[dep] = next;
                    self.args[dep] = TmplArg::Int(v[next]);
                    next != 0 && matches!(self.specs[dep], IterSpec::Ints(_))
                }
                IterSpec::Strings(v) => {
                    let next = (self.index[dep] + 1) % v.len();
                    self.index[dep] = next;
                    self.args[dep] = TmplArg::Str(v[next].clone());
                    next != 0
                }
            };
            trace!(dep, arg = ?self.args[dep], performed, "迭代参数");
            if performed {
                return IterStep::Advanced;
            }
        }
        IterStep::Finished
    }
}
