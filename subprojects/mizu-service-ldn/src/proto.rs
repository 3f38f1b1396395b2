use mizu_service::wire_enum;

pub const SERVICE_NAME_USER: &str = "ldn:u";

pub const CMD_CREATE_USER_LOCAL_COMMUNICATION_SERVICE: u32 = 0;

/// `IUserLocalCommunicationService` command IDs.
pub mod user_cmds {
    pub const GET_STATE: u32 = 0;
    pub const GET_NETWORK_INFO: u32 = 1;
    pub const GET_IPV4_ADDRESS: u32 = 2;
    pub const GET_DISCONNECT_REASON: u32 = 3;
    pub const GET_SECURITY_PARAMETER: u32 = 4;
    pub const GET_NETWORK_CONFIG: u32 = 5;
    pub const ATTACH_STATE_CHANGE_EVENT: u32 = 100;
    pub const GET_NETWORK_INFO_LATEST_UPDATE: u32 = 101;
    pub const SCAN: u32 = 102;
    pub const SCAN_PRIVATE: u32 = 103;
    pub const SET_WIRELESS_CONTROLLER_RESTRICTION: u32 = 104;
    pub const OPEN_ACCESS_POINT: u32 = 200;
    pub const CLOSE_ACCESS_POINT: u32 = 201;
    pub const CREATE_NETWORK: u32 = 202;
    pub const CREATE_NETWORK_PRIVATE: u32 = 203;
    pub const DESTROY_NETWORK: u32 = 204;
    pub const REJECT: u32 = 205;
    pub const SET_ADVERTISE_DATA: u32 = 206;
    pub const SET_STATION_ACCEPT_POLICY: u32 = 207;
    pub const ADD_ACCEPT_FILTER_ENTRY: u32 = 208;
    pub const CLEAR_ACCEPT_FILTER: u32 = 209;
    pub const OPEN_STATION: u32 = 300;
    pub const CLOSE_STATION: u32 = 301;
    pub const CONNECT: u32 = 302;
    pub const CONNECT_PRIVATE: u32 = 303;
    pub const DISCONNECT: u32 = 304;
    pub const INITIALIZE: u32 = 400;
    pub const FINALIZE: u32 = 401;
    pub const INITIALIZE2: u32 = 402;
}

wire_enum! {
    /// Communication state reported by `GetState`.
    pub enum State {
        None = 0,
        Initialized = 1,
        AccessPointOpened = 2,
        AccessPointCreated = 3,
        StationOpened = 4,
        StationConnected = 5,
        Disconnected = 6,
        Error = 7,
    }
}
