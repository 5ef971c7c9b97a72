use super::data::{Coils, Data, Registers};
use super::{common, exception::Code};

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum RequestPdu {
    /// 0x1
    ReadCoils {
        address: u16,
        nobjs: u16,
    },

    /// 0x2
    ReadDiscreteInputs {
        address: u16,
        nobjs: u16,
    },

    /// 0x3
    ReadHoldingRegisters {
        address: u16,
        nobjs: u16,
    },

    /// 0x4
    ReadInputRegisters {
        address: u16,
        nobjs: u16,
    },

    /// 0x5
    WriteSingleCoil {
        address: u16,
        value: bool,
    },

    /// 0x6, value in wire order
    WriteSingleRegister {
        address: u16,
        value: u16,
    },

    /// 0xF
    WriteMultipleCoils {
        address: u16,
        nobjs: u16,
        data: Data,
    },

    /// 0x10
    WriteMultipleRegisters {
        address: u16,
        nobjs: u16,
        data: Data,
    },

    /// Anything else: function code + payload as received. Incoming server
    /// requests arrive in this form and are decoded field-by-field by the
    /// request dispatcher.
    Raw {
        function: u8,
        data: Data,
    },
}

impl RequestPdu {
    /// 0x1
    pub fn read_coils(address: u16, nobjs: u16) -> RequestPdu {
        assert!(common::rd_coils_check(nobjs));
        RequestPdu::ReadCoils { address, nobjs }
    }

    /// 0x2
    pub fn read_discrete_inputs(address: u16, nobjs: u16) -> RequestPdu {
        assert!(common::rd_coils_check(nobjs));
        RequestPdu::ReadDiscreteInputs { address, nobjs }
    }

    /// 0x3
    pub fn read_holding_registers(address: u16, nobjs: u16) -> RequestPdu {
        assert!(common::rd_regs_check(nobjs));
        RequestPdu::ReadHoldingRegisters { address, nobjs }
    }

    /// 0x4
    pub fn read_input_registers(address: u16, nobjs: u16) -> RequestPdu {
        assert!(common::rd_regs_check(nobjs));
        RequestPdu::ReadInputRegisters { address, nobjs }
    }

    /// 0x5
    pub fn write_single_coil(address: u16, value: bool) -> RequestPdu {
        RequestPdu::WriteSingleCoil { address, value }
    }

    /// 0x6
    pub fn write_single_register(address: u16, value: u16) -> RequestPdu {
        RequestPdu::WriteSingleRegister { address, value }
    }

    /// 0xF
    pub fn write_multiple_coils(address: u16, coils: impl Coils) -> RequestPdu {
        let nobjs = coils.coils_count();
        assert!(common::wr_coils_check(nobjs));
        RequestPdu::WriteMultipleCoils {
            address,
            nobjs,
            data: Data::coils(coils),
        }
    }

    /// 0x10
    pub fn write_multiple_registers(address: u16, registers: impl Registers) -> RequestPdu {
        let nobjs = registers.registers_count();
        assert!(common::wr_regs_check(nobjs));
        RequestPdu::WriteMultipleRegisters {
            address,
            nobjs,
            data: Data::registers(registers),
        }
    }

    /// raw
    pub fn raw(function: u8, data: Data) -> RequestPdu {
        RequestPdu::Raw { function, data }
    }

    /// function code + payload length
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        match self {
            RequestPdu::ReadCoils { .. }
            | RequestPdu::ReadDiscreteInputs { .. }
            | RequestPdu::ReadHoldingRegisters { .. }
            | RequestPdu::ReadInputRegisters { .. }
            | RequestPdu::WriteSingleCoil { .. }
            | RequestPdu::WriteSingleRegister { .. } => 5,

            RequestPdu::WriteMultipleCoils { data, .. }
            | RequestPdu::WriteMultipleRegisters { data, .. } => 6 + data.len(),

            RequestPdu::Raw { data, .. } => 1 + data.len(),
        }
    }

    pub fn func(&self) -> u8 {
        match self {
            RequestPdu::ReadCoils { .. } => 0x1,
            RequestPdu::ReadDiscreteInputs { .. } => 0x2,
            RequestPdu::ReadHoldingRegisters { .. } => 0x3,
            RequestPdu::ReadInputRegisters { .. } => 0x4,
            RequestPdu::WriteSingleCoil { .. } => 0x5,
            RequestPdu::WriteSingleRegister { .. } => 0x6,
            RequestPdu::WriteMultipleCoils { .. } => 0xF,
            RequestPdu::WriteMultipleRegisters { .. } => 0x10,
            RequestPdu::Raw { function, .. } => *function,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ResponsePdu {
    /// 0x1, data holds the packed coil bytes
    ReadCoils {
        data: Data,
    },

    /// 0x2
    ReadDiscreteInputs {
        data: Data,
    },

    /// 0x3, data holds the register bytes in wire order
    ReadHoldingRegisters {
        data: Data,
    },

    /// 0x4
    ReadInputRegisters {
        data: Data,
    },

    /// 0x5
    WriteSingleCoil {
        address: u16,
        value: bool,
    },

    /// 0x6, value in wire order
    WriteSingleRegister {
        address: u16,
        value: u16,
    },

    /// 0xF
    WriteMultipleCoils {
        address: u16,
        nobjs: u16,
    },

    /// 0x10
    WriteMultipleRegisters {
        address: u16,
        nobjs: u16,
    },

    /// function carries the 0x80 bit
    Exception {
        function: u8,
        code: Code,
    },
}

impl ResponsePdu {
    /// 0x1
    pub fn read_coils(coils: impl Coils) -> ResponsePdu {
        assert!(common::rd_coils_check(coils.coils_count()));
        ResponsePdu::ReadCoils {
            data: Data::coils(coils),
        }
    }

    /// 0x2
    pub fn read_discrete_inputs(coils: impl Coils) -> ResponsePdu {
        assert!(common::rd_coils_check(coils.coils_count()));
        ResponsePdu::ReadDiscreteInputs {
            data: Data::coils(coils),
        }
    }

    /// 0x3
    pub fn read_holding_registers(registers: impl Registers) -> ResponsePdu {
        assert!(common::rd_regs_check(registers.registers_count()));
        ResponsePdu::ReadHoldingRegisters {
            data: Data::registers(registers),
        }
    }

    /// 0x4
    pub fn read_input_registers(registers: impl Registers) -> ResponsePdu {
        assert!(common::rd_regs_check(registers.registers_count()));
        ResponsePdu::ReadInputRegisters {
            data: Data::registers(registers),
        }
    }

    /// 0x5
    pub fn write_single_coil(address: u16, value: bool) -> ResponsePdu {
        ResponsePdu::WriteSingleCoil { address, value }
    }

    /// 0x6
    pub fn write_single_register(address: u16, value: u16) -> ResponsePdu {
        ResponsePdu::WriteSingleRegister { address, value }
    }

    /// 0xF
    pub fn write_multiple_coils(address: u16, nobjs: u16) -> ResponsePdu {
        assert!(common::wr_coils_check(nobjs));
        ResponsePdu::WriteMultipleCoils { address, nobjs }
    }

    /// 0x10
    pub fn write_multiple_registers(address: u16, nobjs: u16) -> ResponsePdu {
        assert!(common::wr_regs_check(nobjs));
        ResponsePdu::WriteMultipleRegisters { address, nobjs }
    }

    /// make a response with an exception
    pub fn exception(func: u8, code: Code) -> ResponsePdu {
        ResponsePdu::Exception {
            function: func | 0x80,
            code,
        }
    }

    /// function code + payload length
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        match self {
            ResponsePdu::ReadCoils { data }
            | ResponsePdu::ReadDiscreteInputs { data }
            | ResponsePdu::ReadHoldingRegisters { data }
            | ResponsePdu::ReadInputRegisters { data } => 2 + data.len(),
            ResponsePdu::WriteSingleCoil { .. }
            | ResponsePdu::WriteSingleRegister { .. }
            | ResponsePdu::WriteMultipleCoils { .. }
            | ResponsePdu::WriteMultipleRegisters { .. } => 5,
            ResponsePdu::Exception { .. } => 2,
        }
    }

    pub fn func(&self) -> u8 {
        match self {
            ResponsePdu::ReadCoils { .. } => 0x1,
            ResponsePdu::ReadDiscreteInputs { .. } => 0x2,
            ResponsePdu::ReadHoldingRegisters { .. } => 0x3,
            ResponsePdu::ReadInputRegisters { .. } => 0x4,
            ResponsePdu::WriteSingleCoil { .. } => 0x5,
            ResponsePdu::WriteSingleRegister { .. } => 0x6,
            ResponsePdu::WriteMultipleCoils { .. } => 0xF,
            ResponsePdu::WriteMultipleRegisters { .. } => 0x10,
            ResponsePdu::Exception { function, .. } => *function,
        }
    }
}
