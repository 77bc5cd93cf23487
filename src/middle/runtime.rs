//! State shared by the MidIR and assembly interpreters: global addresses,
//! word memory, the string table and the built-in functions.

use hashbrown::HashMap;
use thiserror::Error;

use crate::middle::mir;

/// Addresses below this are never handed out, so a zero or small integer is
/// never mistaken for a pointer.
const FIRST_GLOBAL_ADDRESS: i64 = 10000;
const WORD_SIZE: i64 = 8;

pub const DEFAULT_INSTRUCTION_LIMIT: usize = 50_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpretationError {
    /// A panic raised by the program itself. These are part of the program's
    /// behavior and must survive every optimization.
    #[error("{0}")]
    Panic(String),

    #[error("Program has no '{}' function", mir::MAIN_FUNCTION_NAME)]
    MissingMain,

    #[error("Program exceeded the instruction limit")]
    InstructionLimitExceeded,
}

#[derive(Debug)]
pub struct Runtime {
    addresses: HashMap<String, i64>,
    functions_by_address: HashMap<i64, String>,
    strings: HashMap<i64, String>,
    memory: HashMap<i64, i64>,
    heap_pointer: i64,
    output: String,
    remaining_steps: usize,
}

impl Runtime {
    /// Lays out every global string and then every function at consecutive
    /// word addresses, in declaration order.
    pub fn new<'a>(
        global_variables: &[mir::GlobalVariable],
        function_names: impl IntoIterator<Item = &'a str>,
        instruction_limit: usize,
    ) -> Self {
        let mut runtime = Self {
            addresses: HashMap::new(),
            functions_by_address: HashMap::new(),
            strings: HashMap::new(),
            memory: HashMap::new(),
            heap_pointer: FIRST_GLOBAL_ADDRESS,
            output: String::new(),
            remaining_steps: instruction_limit,
        };

        for global in global_variables {
            let address = runtime.bump(WORD_SIZE);
            runtime.addresses.insert(global.name.clone(), address);
            runtime.strings.insert(address, global.content.clone());
        }

        for name in function_names {
            let address = runtime.bump(WORD_SIZE);
            runtime.addresses.insert(name.to_owned(), address);
            runtime.functions_by_address.insert(address, name.to_owned());
        }

        runtime
    }

    fn bump(&mut self, size: i64) -> i64 {
        let address = self.heap_pointer;
        self.heap_pointer = self.heap_pointer.wrapping_add(size);
        address
    }

    /// Counts one executed instruction against the budget.
    pub fn tick(&mut self) -> Result<(), InterpretationError> {
        if self.remaining_steps == 0 {
            return Err(InterpretationError::InstructionLimitExceeded);
        }
        self.remaining_steps -= 1;
        Ok(())
    }

    pub fn address_of(&self, name: &str) -> i64 {
        match self.addresses.get(name) {
            Some(address) => *address,
            None => internal_error!("reference to undefined global '{name}'"),
        }
    }

    pub fn function_at(&self, address: i64) -> &str {
        match self.functions_by_address.get(&address) {
            Some(name) => name,
            None => internal_error!("call to address {address}, which holds no function"),
        }
    }

    pub fn read(&self, address: i64) -> i64 {
        self.memory.get(&address).copied().unwrap_or(0)
    }

    pub fn write(&mut self, address: i64, value: i64) {
        self.memory.insert(address, value);
    }

    fn string_at(&self, address: i64) -> Result<String, InterpretationError> {
        self.strings
            .get(&address)
            .cloned()
            .ok_or_else(|| InterpretationError::Panic(format!("Bad string at address {address}!")))
    }

    fn allocate_string(&mut self, content: String) -> i64 {
        let address = self.bump(WORD_SIZE);
        self.strings.insert(address, content);
        address
    }

    pub fn call_builtin(
        &mut self,
        builtin: mir::Builtin,
        arguments: &[i64],
    ) -> Result<i64, InterpretationError> {
        let expected_arguments = match builtin {
            mir::Builtin::StringConcat => 2,
            _ => 1,
        };
        if arguments.len() != expected_arguments {
            internal_error!(
                "'{builtin}' takes {expected_arguments} arguments, but got {}",
                arguments.len()
            );
        }

        match builtin {
            mir::Builtin::Malloc => Ok(self.bump(arguments[0])),
            mir::Builtin::Println => {
                let content = self.string_at(arguments[0])?;
                self.output.push_str(&content);
                self.output.push('\n');
                Ok(0)
            }
            mir::Builtin::Throw => Err(InterpretationError::Panic(self.string_at(arguments[0])?)),
            mir::Builtin::IntToString => Ok(self.allocate_string(arguments[0].to_string())),
            mir::Builtin::StringToInt => {
                let content = self.string_at(arguments[0])?;
                content
                    .parse::<i64>()
                    .map_err(|_| InterpretationError::Panic(format!("Bad string: {content}")))
            }
            mir::Builtin::StringConcat => {
                let concatenated = self.string_at(arguments[0])? + &self.string_at(arguments[1])?;
                Ok(self.allocate_string(concatenated))
            }
        }
    }

    pub fn into_output(self) -> String {
        self.output
    }
}
