//! Program registry: the set of loadable programs EXEC can choose from.
//! Producing the `Word` arrays themselves (assembling source, parsing a
//! binary format) is the external loader/assembler's job, out of scope
//! here — this module only tracks what has already been produced.

use crate::word::Word;

#[derive(Debug, Clone)]
pub struct Program {
    pub instructions: Vec<Word>,
    /// 0 means "use 2x program size", per spec §6.
    pub default_alloc_size: usize,
    pub call_count: u64,
}

impl Program {
    pub fn new(instructions: Vec<Word>, default_alloc_size: usize) -> Program {
        Program {
            instructions,
            default_alloc_size,
            call_count: 0,
        }
    }

    pub fn alloc_size(&self) -> usize {
        if self.default_alloc_size == 0 {
            self.instructions.len() * 2
        } else {
            self.default_alloc_size
        }
    }
}

#[derive(Default)]
pub struct ProgramRegistry {
    programs: Vec<Program>,
}

impl ProgramRegistry {
    pub fn new() -> ProgramRegistry {
        ProgramRegistry {
            programs: Vec::new(),
        }
    }

    pub fn register(&mut self, program: Program) -> usize {
        self.programs.push(program);
        self.programs.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Program> {
        self.programs.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Choose a program to EXEC, biased toward the least-called one
    /// (spec §4.8: EXEC "choose a registered program, bias toward least
    /// called"). Ties broken by earliest registration index.
    pub fn choose_least_called(&mut self) -> Option<usize> {
        let idx = self
            .programs
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| p.call_count)
            .map(|(i, _)| i)?;
        self.programs[idx].call_count += 1;
        Some(idx)
    }
}
